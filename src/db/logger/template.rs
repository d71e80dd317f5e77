//! Output templates for SQL trace records, plain and ANSI-colored.

use owo_colors::{OwoColorize, Style};

fn green() -> Style {
    Style::new().green()
}

fn yellow() -> Style {
    Style::new().yellow()
}

fn magenta() -> Style {
    Style::new().magenta()
}

fn blue_bold() -> Style {
    Style::new().blue().bold()
}

fn magenta_bold() -> Style {
    Style::new().magenta().bold()
}

fn red_bold() -> Style {
    Style::new().red().bold()
}

/// Fields shared by every statement record.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TraceFields<'a> {
    pub caller: &'a str,
    pub elapsed_ms: f64,
    pub rows: &'a str,
    pub sql: &'a str,
}

/// Renders records for one datasource. Colors never change field content or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Templates {
    colorful: bool,
}

impl Templates {
    pub fn new(colorful: bool) -> Self {
        Self { colorful }
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if self.colorful {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }

    /// `<caller>\n[<ms>ms] [rows:<n>] <sql>`
    pub fn trace(&self, f: TraceFields<'_>) -> String {
        format!(
            "{}\n{}{} {}",
            self.paint(f.caller, green()),
            self.paint(&format!("[{:.3}ms] ", f.elapsed_ms), yellow()),
            self.paint(&format!("[rows:{}]", f.rows), blue_bold()),
            f.sql
        )
    }

    /// `<caller> <message>\n[<ms>ms] [rows:<n>] <sql>`
    pub fn trace_warn(&self, message: &str, f: TraceFields<'_>) -> String {
        format!(
            "{}{}\n{}{}{}",
            self.paint(&format!("{} ", f.caller), green()),
            self.paint(message, yellow()),
            self.paint(&format!("[{:.3}ms] ", f.elapsed_ms), red_bold()),
            self.paint(&format!("[rows:{}]", f.rows), yellow()),
            self.paint(&format!(" {}", f.sql), magenta())
        )
    }

    /// `<caller> <error>\n[<ms>ms] [rows:<n>] <sql>`
    pub fn trace_error(&self, error: &str, f: TraceFields<'_>) -> String {
        format!(
            "{}{}\n{}{} {}",
            self.paint(&format!("{} ", f.caller), red_bold()),
            self.paint(error, magenta_bold()),
            self.paint(&format!("[{:.3}ms] ", f.elapsed_ms), yellow()),
            self.paint(&format!("[rows:{}]", f.rows), blue_bold()),
            f.sql
        )
    }

    pub fn info(&self, caller: &str, message: &str) -> String {
        format!("{}\n{}", self.paint(caller, green()), message)
    }

    pub fn warn(&self, caller: &str, message: &str) -> String {
        format!("{}\n{}", self.paint(caller, blue_bold()), message)
    }

    pub fn error(&self, caller: &str, message: &str) -> String {
        format!("{}\n{}", self.paint(caller, magenta()), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> TraceFields<'static> {
        TraceFields {
            caller: "app/src/users.rs:42",
            elapsed_ms: 120.5,
            rows: "3",
            sql: "SELECT * FROM users",
        }
    }

    #[test]
    fn test_plain_trace() {
        let t = Templates::new(false);
        assert_eq!(
            t.trace(fields()),
            "app/src/users.rs:42\n[120.500ms] [rows:3] SELECT * FROM users"
        );
    }

    #[test]
    fn test_plain_warn_and_error() {
        let t = Templates::new(false);
        assert_eq!(
            t.trace_warn("SLOW SQL >= 50ms", fields()),
            "app/src/users.rs:42 SLOW SQL >= 50ms\n[120.500ms] [rows:3] SELECT * FROM users"
        );
        assert_eq!(
            t.trace_error("Record not found", fields()),
            "app/src/users.rs:42 Record not found\n[120.500ms] [rows:3] SELECT * FROM users"
        );
        assert_eq!(t.info("c", "m"), "c\nm");
    }

    #[test]
    fn test_colored_trace_styles_each_field() {
        let colored = Templates::new(true);
        assert_eq!(
            colored.trace(fields()),
            format!(
                "{}\n{}{} SELECT * FROM users",
                "app/src/users.rs:42".style(green()),
                "[120.500ms] ".style(yellow()),
                "[rows:3]".style(blue_bold()),
            )
        );
        assert_eq!(
            colored.trace_error("boom", fields()),
            format!(
                "{}{}\n{}{} SELECT * FROM users",
                "app/src/users.rs:42 ".style(red_bold()),
                "boom".style(magenta_bold()),
                "[120.500ms] ".style(yellow()),
                "[rows:3]".style(blue_bold()),
            )
        );
    }

    #[test]
    fn test_colored_keeps_plain_fields_in_order() {
        let colored = Templates::new(true);
        let plain = Templates::new(false);
        for (c, p) in [
            (colored.trace(fields()), plain.trace(fields())),
            (colored.trace_warn("slow", fields()), plain.trace_warn("slow", fields())),
            (colored.trace_error("boom", fields()), plain.trace_error("boom", fields())),
        ] {
            assert_ne!(c, p);
            assert_eq!(c.lines().count(), p.lines().count());
            let mut rest = c.as_str();
            for piece in ["app/src/users.rs:42", "120.500ms", "rows:3", "SELECT * FROM users"] {
                let at = rest.find(piece).unwrap();
                rest = &rest[at + piece.len()..];
            }
        }
    }
}
