//! Server-rendered pages.

use handlebars::Handlebars;
use serde_json::json;

const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");

/// Registered page templates.
pub struct Pages {
    registry: Handlebars<'static>,
    static_url: String,
}

impl Pages {
    /// Register the built-in templates. `static_url` prefixes asset links.
    pub fn new(static_url: impl Into<String>) -> resume_common::Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry
            .register_template_string("index", INDEX_TEMPLATE)
            .map_err(|e| resume_common::Error::Config(format!("invalid index template: {e}")))?;

        Ok(Self {
            registry,
            static_url: static_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Render the chat page.
    pub fn index(&self) -> resume_common::Result<String> {
        self.registry
            .render(
                "index",
                &json!({
                    "static_url": self.static_url,
                    "version": env!("CARGO_PKG_VERSION"),
                }),
            )
            .map_err(|e| resume_common::Error::Internal(format!("failed to render index: {e}")))
    }
}
