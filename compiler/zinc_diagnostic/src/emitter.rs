//! Terminal diagnostic emitter.
//!
//! Renders `file:line:col: severity: message`, the offending source line,
//! and a caret run under the primary span, then any note labels. ANSI
//! color is gated by [`ColorMode`].

use std::io::{self, IsTerminal, Write};

use zinc_ir::LineIndex;

use crate::{Diagnostic, Severity};

/// `--color {auto|on|off}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorMode {
    #[default]
    Auto,
    On,
    Off,
}

impl ColorMode {
    fn enabled(self, stream_is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => stream_is_tty,
            ColorMode::On => true,
            ColorMode::Off => false,
        }
    }
}

/// Source text and metadata the emitter needs per file.
pub struct SourceFile {
    pub path: String,
    pub source: String,
    pub line_index: LineIndex,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, source: String) -> SourceFile {
        let line_index = LineIndex::new(&source);
        SourceFile {
            path: path.into(),
            source,
            line_index,
        }
    }
}

const RED: &str = "\x1b[31;1m";
const YELLOW: &str = "\x1b[33;1m";
const CYAN: &str = "\x1b[36;1m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

pub struct Emitter {
    color: ColorMode,
}

impl Emitter {
    pub fn new(color: ColorMode) -> Emitter {
        Emitter { color }
    }

    /// Print every diagnostic to stderr.
    pub fn emit_all(&self, diagnostics: &[Diagnostic], files: &[SourceFile]) {
        let stderr = io::stderr();
        let use_color = self.color.enabled(stderr.is_terminal());
        let mut out = stderr.lock();
        for diagnostic in diagnostics {
            // Diagnostic output failing means stderr is gone; nothing
            // useful left to do.
            let _ = self.emit_one(&mut out, diagnostic, files, use_color);
        }
    }

    fn emit_one(
        &self,
        out: &mut impl Write,
        diagnostic: &Diagnostic,
        files: &[SourceFile],
        use_color: bool,
    ) -> io::Result<()> {
        self.emit_span(
            out,
            diagnostic.severity,
            &diagnostic.message,
            diagnostic.file,
            diagnostic.span,
            files,
            use_color,
        )?;
        for note in &diagnostic.notes {
            self.emit_span(
                out,
                Severity::Note,
                &note.message,
                note.file,
                note.span,
                files,
                use_color,
            )?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_span(
        &self,
        out: &mut impl Write,
        severity: Severity,
        message: &str,
        file: u32,
        span: zinc_ir::Span,
        files: &[SourceFile],
        use_color: bool,
    ) -> io::Result<()> {
        let source_file = &files[file as usize];
        let loc = source_file.line_index.locate(span.start);
        let sev_color = match severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
            Severity::Note => CYAN,
        };
        if use_color {
            writeln!(
                out,
                "{BOLD}{}:{}:{}: {sev_color}{}:{RESET}{BOLD} {message}{RESET}",
                source_file.path,
                loc.line,
                loc.column + 1,
                severity.header(),
            )?;
        } else {
            writeln!(
                out,
                "{}:{}:{}: {}: {message}",
                source_file.path,
                loc.line,
                loc.column + 1,
                severity.header(),
            )?;
        }

        let (line_start, line_end) =
            source_file
                .line_index
                .line_range(loc.line, source_file.source.len() as u32);
        let line_text = &source_file.source[line_start as usize..line_end as usize];
        writeln!(out, "{line_text}")?;

        let caret_len = span.len().max(1).min(line_end.saturating_sub(span.start)) as usize;
        let pad = " ".repeat(loc.column as usize);
        let carets = "^".repeat(caret_len.max(1));
        if use_color {
            writeln!(out, "{pad}{sev_color}{carets}{RESET}")?;
        } else {
            writeln!(out, "{pad}{carets}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zinc_ir::Span;

    #[test]
    fn color_mode_gating() {
        assert!(ColorMode::On.enabled(false));
        assert!(!ColorMode::Off.enabled(true));
        assert!(ColorMode::Auto.enabled(true));
        assert!(!ColorMode::Auto.enabled(false));
    }

    #[test]
    fn emit_renders_position_and_caret() {
        let files = [SourceFile::new(
            "main.zn",
            "const x: u8 = 300;\n".to_string(),
        )];
        let diagnostic = Diagnostic::error(0, Span::new(14, 17), "does not fit");
        let emitter = Emitter::new(ColorMode::Off);
        let mut buffer = Vec::new();
        emitter
            .emit_one(&mut buffer, &diagnostic, &files, false)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("main.zn:1:15: error: does not fit"));
        assert!(text.contains("^^^"));
    }
}
