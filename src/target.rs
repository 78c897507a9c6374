//! Target definitions and their listing formats.

use crate::error::Result;
use crate::format::{pad_right, yellow};
use crate::sink::OutputSink;
use serde::{Deserialize, Serialize};

/// A named unit of work: a shell script plus targets to run around it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Filled from the mapping key when the file is loaded.
    #[serde(skip)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
    #[serde(default)]
    pub cmd: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Target {
    /// Targets whose name starts with `_` are omitted from short listings.
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('_')
    }

    /// Write this target's listing entry.
    ///
    /// The short form is one line, with names padded to `width`. The verbose
    /// form also shows dependencies and the command.
    pub fn list(&self, verbose: bool, width: usize, out: &OutputSink) -> Result<()> {
        if !verbose {
            if self.is_hidden() {
                return Ok(());
            }
            let padded = pad_right(&self.name, width);
            let pad = &padded[self.name.len()..];
            out.write_str(&format!(
                "{}{} {}\n",
                yellow(&self.name),
                pad,
                self.description.trim()
            ))?;
            return Ok(());
        }

        let mut text = format!("{}: \n", yellow(&self.name));
        if !self.description.is_empty() {
            text.push_str(&format!("  - description: {}\n", self.description.trim()));
        }
        if !self.before.is_empty() {
            text.push_str(&format!("  - before: {}\n", self.before.join(", ")));
        }
        if !self.after.is_empty() {
            text.push_str(&format!("  - after: {}\n", self.after.join(", ")));
        }
        let cmd = self.cmd.trim_end().replace('\n', "\n    ");
        text.push_str(&format!("  - cmd:\n    {}\n", cmd));
        out.write_str(&text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str) -> Target {
        Target {
            name: name.to_string(),
            before: vec!["prep".into(), "fetch".into()],
            after: vec!["clean".into()],
            cmd: "echo one\necho two\n".into(),
            description: "builds things ".into(),
        }
    }

    #[test]
    fn test_list_short_pads_name() {
        let out = OutputSink::memory();
        target("run").list(false, 6, &out).unwrap();
        assert_eq!(out.contents(), format!("{}    builds things\n", yellow("run")));
    }

    #[test]
    fn test_list_verbose() {
        let out = OutputSink::memory();
        target("run").list(true, 0, &out).unwrap();
        let expected = format!(
            "{}: \n  - description: builds things\n  - before: prep, fetch\n  - after: clean\n  - cmd:\n    echo one\n    echo two\n",
            yellow("run")
        );
        assert_eq!(out.contents(), expected);
    }

    #[test]
    fn test_hidden_target_only_in_verbose_listing() {
        let out = OutputSink::memory();
        target("_internal").list(false, 10, &out).unwrap();
        assert_eq!(out.contents(), "");
        target("_internal").list(true, 10, &out).unwrap();
        assert!(out.contents().contains("_internal"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let t: Target = serde_yaml::from_str("cmd: make\n").unwrap();
        assert!(t.before.is_empty());
        assert!(t.after.is_empty());
        assert_eq!(t.cmd, "make");
        assert_eq!(t.name, "");
    }
}
