//! Jam Pathnames
//!
//! A Jam pathname decomposes into six fields:
//!
//!   <grist>root/dir/base.suffix(member)
//!
//! `grist` qualifies target names without touching the filesystem path,
//! `member` addresses an archive member. `build()` re-emits the path with
//! platform-appropriate separators; in binding mode the grist is dropped and
//! empty directory components are omitted.

use lazy_static::lazy_static;

/// Host platform facts, detected once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Platform {
    pub is_vms: bool,
    pub is_windows: bool,
}

impl Platform {
    pub fn detect() -> Self {
        Platform {
            is_vms: cfg!(target_os = "vms"),
            is_windows: cfg!(windows),
        }
    }

    pub fn unix() -> Self {
        Platform {
            is_vms: false,
            is_windows: false,
        }
    }

    pub fn windows() -> Self {
        Platform {
            is_vms: false,
            is_windows: true,
        }
    }

    pub fn vms() -> Self {
        Platform {
            is_vms: true,
            is_windows: false,
        }
    }

    /// Separator used in PATH-like environment variables.
    pub fn path_separator(&self) -> char {
        if self.is_windows {
            ';'
        } else {
            ':'
        }
    }

    fn dir_separator(&self) -> char {
        if self.is_windows {
            '\\'
        } else {
            '/'
        }
    }
}

lazy_static! {
    static ref PLATFORM: Platform = Platform::detect();
}

/// Host platform record, computed on first use.
pub fn host_platform() -> Platform {
    *PLATFORM
}

pub fn check_vms() -> bool {
    PLATFORM.is_vms
}

pub fn check_windows() -> bool {
    PLATFORM.is_windows
}

/// Escape a path for a Ninja file: `$`, space and `:` are significant there.
pub fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '$' => out.push_str("$$"),
            ' ' => out.push_str("$ "),
            ':' => out.push_str("$:"),
            _ => out.push(c),
        }
    }
    out
}

/// A parsed Jam pathname.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pathname {
    /// Text inside `<...>`, without the brackets.
    pub grist: String,
    /// Prefix applied when the path itself is not rooted (LOCATE/SEARCH).
    pub root: String,
    pub dir: String,
    pub base: String,
    /// Includes the leading dot.
    pub suffix: String,
    /// Text inside a trailing `(...)`, without the parens.
    pub member: String,
}

impl Pathname {
    pub fn parse(name: &str) -> Self {
        let mut p = Pathname::default();
        let mut rest = name;

        if rest.starts_with('<') {
            if let Some(end) = rest.find('>') {
                p.grist = rest[1..end].to_string();
                rest = &rest[end + 1..];
            }
        }

        if rest.ends_with(')') {
            if let Some(start) = rest.rfind('(') {
                p.member = rest[start + 1..rest.len() - 1].to_string();
                rest = &rest[..start];
            }
        }

        let split = rest.rfind(|c| c == '/' || c == '\\');
        let (dir, file) = match split {
            Some(i) => {
                // keep a lone leading separator so absolute paths survive
                let d = if i == 0 { &rest[..1] } else { &rest[..i] };
                (d, &rest[i + 1..])
            }
            None => ("", rest),
        };
        p.dir = dir.to_string();

        match file.rfind('.') {
            Some(i) if i > 0 => {
                p.base = file[..i].to_string();
                p.suffix = file[i..].to_string();
            }
            _ => p.base = file.to_string(),
        }

        p
    }

    fn is_rooted(&self) -> bool {
        self.dir.starts_with('/')
            || self.dir.starts_with('\\')
            || (self.dir.len() >= 2 && self.dir.as_bytes()[1] == b':')
    }

    /// Re-emit the pathname for the host platform.
    pub fn build(&self, binding: bool) -> String {
        self.build_for(binding, host_platform())
    }

    /// Re-emit the pathname for an explicit platform.
    ///
    /// In binding mode the grist and member are dropped and empty directory
    /// components are omitted; the result is a plain filesystem path.
    pub fn build_for(&self, binding: bool, platform: Platform) -> String {
        let mut out = String::new();

        if !binding && !self.grist.is_empty() {
            out.push('<');
            out.push_str(&self.grist);
            out.push('>');
        }

        if platform.is_vms {
            self.build_vms(&mut out);
        } else {
            let sep = platform.dir_separator();
            let mut dir = String::new();
            if !self.root.is_empty() && !self.is_rooted() {
                dir.push_str(&self.root);
                if !dir.ends_with(sep) && !dir.ends_with('/') && !self.dir.is_empty() {
                    dir.push(sep);
                }
            }
            dir.push_str(&self.dir);
            if !dir.is_empty() {
                out.push_str(&dir);
                if !dir.ends_with(sep) && !dir.ends_with('/') {
                    out.push(sep);
                }
            }
            out.push_str(&self.base);
            out.push_str(&self.suffix);
        }

        if !binding && !self.member.is_empty() {
            out.push('(');
            out.push_str(&self.member);
            out.push(')');
        }

        out
    }

    // device:[dir.subdir]base.suffix
    fn build_vms(&self, out: &mut String) {
        if !self.root.is_empty() && !self.is_rooted() {
            out.push_str(&self.root);
            if !self.root.ends_with(':') && !self.root.ends_with(']') {
                out.push(':');
            }
        }
        if !self.dir.is_empty() {
            out.push('[');
            out.push_str(&self.dir.replace('/', "."));
            out.push(']');
        }
        out.push_str(&self.base);
        out.push_str(&self.suffix);
    }

    /// Parent directory: the dir when a file part is present, otherwise the
    /// dir's own parent.
    pub fn parent(&self) -> String {
        if !self.base.is_empty() || !self.suffix.is_empty() {
            return self.dir.clone();
        }
        match self.dir.rfind('/') {
            Some(0) => "/".to_string(),
            Some(i) => self.dir[..i].to_string(),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_file() {
        let p = Pathname::parse("src/main.c");
        assert_eq!(p.grist, "");
        assert_eq!(p.dir, "src");
        assert_eq!(p.base, "main");
        assert_eq!(p.suffix, ".c");
        assert_eq!(p.member, "");
    }

    #[test]
    fn test_parse_grist_and_member() {
        let p = Pathname::parse("<lib>archive.a(obj.o)");
        assert_eq!(p.grist, "lib");
        assert_eq!(p.base, "archive");
        assert_eq!(p.suffix, ".a");
        assert_eq!(p.member, "obj.o");
    }

    #[test]
    fn test_parse_no_suffix() {
        let p = Pathname::parse("bin/app");
        assert_eq!(p.base, "app");
        assert_eq!(p.suffix, "");
    }

    #[test]
    fn test_parse_dotfile_has_no_suffix() {
        let p = Pathname::parse(".profile");
        assert_eq!(p.base, ".profile");
        assert_eq!(p.suffix, "");
    }

    #[test]
    fn test_parse_absolute() {
        let p = Pathname::parse("/tmp/x.h");
        assert_eq!(p.dir, "/tmp");
        assert_eq!(p.base, "x");
        assert_eq!(p.suffix, ".h");
    }

    #[test]
    fn test_build_roundtrip() {
        let p = Pathname::parse("<g>src/main.c");
        assert_eq!(p.build_for(false, Platform::unix()), "<g>src/main.c");
        assert_eq!(p.build_for(true, Platform::unix()), "src/main.c");
    }

    #[test]
    fn test_build_with_root() {
        let mut p = Pathname::parse("main.c");
        p.root = "build/obj".to_string();
        assert_eq!(p.build_for(true, Platform::unix()), "build/obj/main.c");
    }

    #[test]
    fn test_build_root_ignored_when_rooted() {
        let mut p = Pathname::parse("/abs/main.c");
        p.root = "elsewhere".to_string();
        assert_eq!(p.build_for(true, Platform::unix()), "/abs/main.c");
    }

    #[test]
    fn test_build_windows_separators() {
        let mut p = Pathname::parse("src/main.c");
        p.root = "out".to_string();
        assert_eq!(p.build_for(true, Platform::windows()), "out\\src\\main.c");
    }

    #[test]
    fn test_build_vms_brackets() {
        let mut p = Pathname::parse("sub/dir/main.c");
        p.root = "dev".to_string();
        assert_eq!(p.build_for(true, Platform::vms()), "dev:[sub.dir]main.c");
    }

    #[test]
    fn test_parent() {
        assert_eq!(Pathname::parse("a/b/c.h").parent(), "a/b");
        assert_eq!(Pathname::parse("a/b/").parent(), "a");
        assert_eq!(Pathname::parse("c.h").parent(), "");
    }

    #[test]
    fn test_escape_path() {
        assert_eq!(escape_path("plain/path.c"), "plain/path.c");
        assert_eq!(escape_path("has space"), "has$ space");
        assert_eq!(escape_path("a:b"), "a$:b");
        assert_eq!(escape_path("$x"), "$$x");
    }
}
