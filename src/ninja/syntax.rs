//! Ninja Syntax Writer
//!
//! A thin formatter for `build.ninja` files: `rule`, `build` and `default`
//! statements with indented variable bindings. Long lines fold at the
//! configured width with `$` continuations.

use std::io::{self, Write};

#[derive(Debug, Default)]
pub struct RuleOpts {
    pub description: Option<String>,
    pub depfile: Option<String>,
    pub restat: bool,
    pub generator: bool,
    pub rspfile: Option<String>,
    pub rspfile_content: Option<String>,
}

pub struct Writer<W: Write> {
    out: W,
    width: usize,
}

impl<W: Write> Writer<W> {
    pub fn new(out: W, width: usize) -> Self {
        Writer { out, width }
    }

    pub fn rule(&mut self, name: &str, command: &str, opts: &RuleOpts) -> io::Result<()> {
        self.line(&format!("rule {}", name), 0)?;
        self.variable("command", command, 1)?;
        if let Some(description) = &opts.description {
            self.variable("description", description, 1)?;
        }
        if let Some(depfile) = &opts.depfile {
            self.variable("depfile", depfile, 1)?;
        }
        if opts.generator {
            self.variable("generator", "1", 1)?;
        }
        if opts.restat {
            self.variable("restat", "1", 1)?;
        }
        if let Some(rspfile) = &opts.rspfile {
            self.variable("rspfile", rspfile, 1)?;
        }
        if let Some(content) = &opts.rspfile_content {
            self.variable("rspfile_content", content, 1)?;
        }
        Ok(())
    }

    pub fn build(
        &mut self,
        outputs: &[String],
        rule: &str,
        inputs: &[String],
        implicit: &[String],
        order_only: &[String],
    ) -> io::Result<()> {
        let mut line = format!("build {}: {}", outputs.join(" "), rule);
        if !inputs.is_empty() {
            line.push(' ');
            line.push_str(&inputs.join(" "));
        }
        if !implicit.is_empty() {
            line.push_str(" | ");
            line.push_str(&implicit.join(" "));
        }
        if !order_only.is_empty() {
            line.push_str(" || ");
            line.push_str(&order_only.join(" "));
        }
        self.line(&line, 0)
    }

    pub fn default(&mut self, name: &str) -> io::Result<()> {
        self.line(&format!("default {}", name), 0)
    }

    fn variable(&mut self, key: &str, value: &str, indent: usize) -> io::Result<()> {
        self.line(&format!("{} = {}", key, value), indent)
    }

    fn line(&mut self, text: &str, indent: usize) -> io::Result<()> {
        // command values carry their own `$`-newline continuations; fold
        // only single-line text
        if text.contains('\n') {
            return writeln!(self.out, "{}{}", "  ".repeat(indent), text);
        }

        let mut leading = "  ".repeat(indent);
        let mut rest = text;
        while leading.len() + rest.len() > self.width {
            // room for the trailing " $"
            let available = self.width.saturating_sub(leading.len() + 2);
            let Some(space) = wrap_point(rest, available) else {
                break;
            };
            writeln!(self.out, "{}{} $", leading, &rest[..space])?;
            rest = &rest[space + 1..];
            leading = "  ".repeat(indent + 2);
        }
        writeln!(self.out, "{}{}", leading, rest)
    }
}

// Last breakable space within `limit`, else the first one after it. A
// space preceded by `$` is escaped and never a break point.
fn wrap_point(text: &str, limit: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let breakable =
        |i: usize| bytes[i] == b' ' && (i == 0 || bytes[i - 1] != b'$');

    let end = limit.min(bytes.len());
    (0..end)
        .rev()
        .find(|&i| breakable(i))
        .or_else(|| (end..bytes.len()).find(|&i| breakable(i)))
}
