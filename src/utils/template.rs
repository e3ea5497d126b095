use anyhow::{Context, Result};
use handlebars::{no_escape, Handlebars};
use serde::Serialize;
use tracing::debug;

pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        // A variable missing from the context is a bug in the caller, not an
        // empty string in a generated config file.
        handlebars.set_strict_mode(true);
        // Output is YAML, nginx config, shell and Python, never HTML.
        handlebars.register_escape_fn(no_escape);

        Self { handlebars }
    }

    pub fn register_template(&mut self, name: &str, template: &str) -> Result<()> {
        self.handlebars
            .register_template_string(name, template)
            .with_context(|| format!("Failed to register template: {name}"))
    }

    pub fn render_registered<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        debug!("Rendering template: {}", template_name);

        self.handlebars
            .render(template_name, context)
            .with_context(|| format!("Failed to render registered template: {template_name}"))
    }

    pub fn render_string<T: Serialize>(&self, template: &str, context: &T) -> Result<String> {
        self.handlebars
            .render_template(template, context)
            .with_context(|| format!("Failed to render template: {template}"))
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.handlebars.has_template(name)
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}
