//! Whole-artifact minification with oxc

use anyhow::{Result, bail};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;

use super::Rewriter;

/// Compresses and mangles the artifact; top-level names are left alone so
/// the loader shim keeps seeing the host's `module`, `define` and `this`
#[derive(Debug, Default, Clone, Copy)]
pub struct Minify;

impl Rewriter for Minify {
    fn name(&self) -> &str {
        "minify"
    }

    fn rewrite(&self, code: &str) -> Result<String> {
        let allocator = Allocator::default();
        // The artifact is a classic script: it relies on a sloppy top-level `this`
        let source_type = SourceType::mjs().with_module(false);
        let parsed = Parser::new(&allocator, code, source_type).parse();
        if let Some(error) = parsed.errors.first() {
            bail!("generated artifact does not parse: {error}");
        }

        let mut program = parsed.program;
        let minified = Minifier::new(MinifierOptions::default()).minify(&allocator, &mut program);
        let output = Codegen::new()
            .with_options(CodegenOptions::minify())
            .with_scoping(minified.scoping)
            .build(&program);
        Ok(output.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minify_shrinks_and_keeps_strings() -> Result<()> {
        let code = "(function (root, factory) {\n  root.answer = factory();\n})(this, function () {\n  var someLongName = \"kept\";\n  return someLongName + \"!\";\n});\n";
        let minified = Minify.rewrite(code)?;
        assert!(minified.len() < code.len());
        assert!(minified.contains("kept"));
        assert!(!minified.contains("someLongName"));
        Ok(())
    }

    #[test]
    fn test_minify_rejects_broken_input() {
        assert!(Minify.rewrite("function (").is_err());
    }
}
