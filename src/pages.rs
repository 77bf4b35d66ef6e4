//! Server-rendered pages — tera template registry and render helper.
//!
//! Templates are embedded at compile time so the binary carries everything
//! it needs and the test server renders without a working directory.

use axum::response::Html;
use tera::{Context, Tera};

use crate::error::Result;

/// Build the template registry.
pub fn templates() -> std::result::Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        ("base.html", include_str!("../templates/base.html")),
        (
            "users/login.html",
            include_str!("../templates/users/login.html"),
        ),
        (
            "users/profile/edit.html",
            include_str!("../templates/users/profile/edit.html"),
        ),
        (
            "users/profile/detail.html",
            include_str!("../templates/users/profile/detail.html"),
        ),
    ])?;
    Ok(tera)
}

/// Render a template into an HTML response.
pub fn render(tera: &Tera, name: &str, ctx: &Context) -> Result<Html<String>> {
    Ok(Html(tera.render(name, ctx)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_templates_register() {
        let tera = templates().unwrap();
        let names: Vec<_> = tera.get_template_names().collect();
        assert!(names.contains(&"users/login.html"));
        assert!(names.contains(&"users/profile/edit.html"));
        assert!(names.contains(&"users/profile/detail.html"));
    }

    #[test]
    fn login_renders_flash_messages() {
        let tera = templates().unwrap();
        let mut ctx = Context::new();
        ctx.insert(
            "messages",
            &vec![crate::store::FlashMessage::error("boom")],
        );
        let html = tera.render("users/login.html", &ctx).unwrap();
        assert!(html.contains("boom"));
    }
}
