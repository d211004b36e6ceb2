//! Offline rendering of a sandbox document, for opening in a browser.

use std::path::Path;

use workbench_sandbox::{
    Generation, HandlebarsTemplateRenderer, SandboxDocument, SandboxError, transform,
};

pub fn render_source(source: &str) -> Result<String, SandboxError> {
    let transformed = transform(source)?;
    SandboxDocument::new(Generation(1), transformed).render(&HandlebarsTemplateRenderer)
}

/// Renders the component in `input` and writes the document to `output`.
pub fn render_file(input: &Path, output: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(input)?;
    let html = render_source(&source)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, &html)?;
    Ok(html.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use workbench_sandbox::TransformError;

    #[test]
    fn writes_a_standalone_document() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Counter.tsx");
        let output = dir.path().join("out/preview.html");
        std::fs::write(
            &input,
            "export default function Counter(): JSX.Element { return <Card>0</Card>; }\n",
        )
        .unwrap();

        let written = render_file(&input, &output).unwrap();
        let html = std::fs::read_to_string(&output).unwrap();
        assert_eq!(written, html.len());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("React.createElement(Counter)"));
    }

    #[test]
    fn source_without_component_is_rejected() {
        assert_eq!(
            render_source("const answer = 42;").unwrap_err(),
            SandboxError::Transform(TransformError::NoEntryPoint)
        );
    }
}
