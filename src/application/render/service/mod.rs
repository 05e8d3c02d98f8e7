mod config;
mod markdown;

use std::collections::HashMap;

use comrak::{Arena, format_html, nodes::AstNode, parse_document};

use crate::application::render::types::{DocumentRenderer, RenderError, RenderedDocument};
use crate::domain::injection::{InjectedValue, InjectionKey};
use crate::domain::templates::TemplateDefinition;

use config::{build_document_sanitizer, default_options};
use markdown::substitute;

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Substitutes values into the markdown body, renders it with Comrak and
/// sanitises the HTML with Ammonia.
pub struct ComrakDocumentRenderer {
    options: comrak::Options<'static>,
    sanitizer: ammonia::Builder<'static>,
}

impl ComrakDocumentRenderer {
    pub fn new() -> Self {
        Self {
            options: default_options(),
            sanitizer: build_document_sanitizer(),
        }
    }
}

impl Default for ComrakDocumentRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentRenderer for ComrakDocumentRenderer {
    fn render(
        &self,
        template: &TemplateDefinition,
        values: &HashMap<InjectionKey, InjectedValue>,
    ) -> Result<RenderedDocument, RenderError> {
        let markdown = substitute(template, values)?;

        let arena = Arena::new();
        let root = parse_document(&arena, &markdown, &self.options);
        let rendered_html = render_html_stage(root, &self.options)?;
        let body = self.sanitizer.clean(&rendered_html).to_string();

        Ok(RenderedDocument {
            bytes: wrap_document(&template.document_type_code, &body).into_bytes(),
            content_type: HTML_CONTENT_TYPE.to_string(),
        })
    }
}

fn render_html_stage<'a>(
    root: &'a AstNode<'a>,
    options: &comrak::Options<'static>,
) -> Result<String, RenderError> {
    let mut html = String::new();
    format_html(root, options, &mut html).map_err(|err| RenderError::Markdown {
        message: err.to_string(),
    })?;
    Ok(html)
}

fn wrap_document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
        ammonia::clean_text(title),
        body
    )
}
