//! Jam Driver
//!
//! Ties the pipeline together: preset variables, parse and evaluate the
//! Jam source, bind targets, scan headers, repair cycles, emit
//! `build.ninja`.

use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use tracing::info;

use crate::fs::FileProvider;
use crate::graph::headers::SearchKind;
use crate::graph::{self, target};
use crate::interpreter::interpreter::run;
use crate::interpreter::state::{DebugFlags, State, StateConfig};
use crate::interpreter::types::ExecError;
use crate::ninja::ninja_build;
use crate::paths::Platform;

/// Standard rules available to every Jamfile when no Jambase is supplied.
/// A site Jambase passed with `--jambase` replaces this prelude entirely.
pub const DEFAULT_JAMBASE: &str = "\
NOTFILE all first shell files lib exe obj dirs ;
DEPENDS all : shell files lib exe obj ;

rule HdrRule
{
    INCLUDES $(1) : $(2) ;
}

rule MkDir
{
    NOUPDATE $(1) ;
    MKDIR $(1) ;
}
";

pub struct JamOptions {
    /// Path of the user build description.
    pub jamfile: String,
    /// Jambase source prepended to the Jamfile; reading it from disk is
    /// the caller's business.
    pub jambase: Option<String>,
    pub verbose: bool,
    pub debug: DebugFlags,
    pub search_type: SearchKind,
    /// Limit debug output to matching targets.
    pub limit_target: Option<String>,
    /// `-e K=V` overrides, split once on `=`.
    pub env_overrides: Vec<String>,
    /// Value of `NINJA_ROOTDIR`; defaults to the absolute cwd.
    pub root_dir: Option<String>,
    pub platform: Option<Platform>,
    pub fs: Option<Arc<dyn FileProvider>>,
    /// Environment snapshot override for tests.
    pub env: Option<Vec<(String, String)>>,
}

impl Default for JamOptions {
    fn default() -> Self {
        JamOptions {
            jamfile: "Jamfile".to_string(),
            jambase: None,
            verbose: false,
            debug: DebugFlags::default(),
            search_type: SearchKind::default(),
            limit_target: None,
            env_overrides: Vec::new(),
            root_dir: None,
            platform: None,
            fs: None,
            env: None,
        }
    }
}

/// The front-end: evaluates a Jam build description and produces the
/// Ninja directives for it.
pub struct Jam {
    state: State,
    jamfile: String,
    jambase: Option<String>,
    search_type: SearchKind,
    root_dir: String,
}

impl Jam {
    pub fn new(options: JamOptions) -> Self {
        let mut state = State::with_config(StateConfig {
            verbose: options.verbose,
            debug: options.debug,
            limit_target: options.limit_target,
            platform: options.platform,
            fs: options.fs,
            env: options.env,
        });

        let root_dir = options.root_dir.unwrap_or_else(|| {
            std::env::current_dir()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|_| ".".to_string())
        });

        state
            .vars
            .set("JAMFILE", vec![options.jamfile.clone()]);
        state
            .vars
            .set("NINJA_ROOTDIR", vec![root_dir.clone()]);

        for var in &options.env_overrides {
            match var.split_once('=') {
                Some((key, value)) => state.vars.set(key, vec![value.to_string()]),
                None => state.vars.set(var, vec![String::new()]),
            }
        }

        Jam {
            state,
            jamfile: options.jamfile,
            jambase: options.jambase,
            search_type: options.search_type,
            root_dir,
        }
    }

    /// Evaluate the build description and construct the bound, scanned,
    /// cycle-free target graph.
    pub fn run(&mut self) -> Result<(), ExecError> {
        let state = &mut self.state;

        if !state.fs.exists(&self.jamfile) {
            return Err(ExecError::JamfileNotFound);
        }
        let jamfile = state.fs.read(&self.jamfile)?;
        let source = match &self.jambase {
            Some(jambase) => format!("{}\n{}", jambase, jamfile),
            None => jamfile,
        };

        if state.verbose {
            info!("...parsing jam files...");
        }
        let cmds = state.parse_and_compile(&source, Some(&self.jamfile))?;

        if state.verbose {
            info!("...execution...");
        }
        run(state, &cmds)?;

        if state.verbose {
            info!("...binding targets and searching headers...");
        }
        graph::bind_targets(state, self.search_type)?;

        let all = state.targets.bind("all");
        target::search_for_cycles(state, all);
        Ok(())
    }

    /// Emit the Ninja directives for the evaluated graph.
    pub fn write_ninja<W: Write>(&mut self, out: W) -> Result<(), ExecError> {
        ninja_build(&mut self.state, out)
    }

    /// The whole pipeline: evaluate, then write `build.ninja` under the
    /// root directory.
    pub fn generate(&mut self) -> Result<(), ExecError> {
        self.run()?;
        println!("...found {} target(s)...", self.state.targets.len());

        if self.state.verbose {
            info!("...writing build.ninja...");
        }
        let path = format!("{}/build.ninja", self.root_dir.trim_end_matches('/'));
        let file = File::create(path)?;
        self.write_ninja(file)
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RealFs;
    use std::path::Path;

    fn build(dir: &Path, jamfile: &str) -> (Jam, String) {
        std::fs::write(dir.join("Jamfile"), jamfile).unwrap();
        let mut jam = Jam::new(JamOptions {
            jambase: Some(DEFAULT_JAMBASE.to_string()),
            fs: Some(Arc::new(RealFs::rooted(dir))),
            platform: Some(Platform::unix()),
            env: Some(Vec::new()),
            root_dir: Some(dir.display().to_string()),
            ..JamOptions::default()
        });
        jam.run().unwrap();
        let mut buf = Vec::new();
        jam.write_ninja(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        (jam, text)
    }

    #[test]
    fn test_missing_jamfile() {
        let dir = tempfile::tempdir().unwrap();
        let mut jam = Jam::new(JamOptions {
            fs: Some(Arc::new(RealFs::rooted(dir.path()))),
            env: Some(Vec::new()),
            root_dir: Some(dir.path().display().to_string()),
            ..JamOptions::default()
        });
        assert!(matches!(jam.run(), Err(ExecError::JamfileNotFound)));
    }

    #[test]
    fn test_simple_copy_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test.h"), "").unwrap();
        let (_, out) = build(
            dir.path(),
            "actions cp { cp $(>) $(<) }\n\
             cp test.c : test.h ;\n\
             DEPENDS all : test.c ;\n",
        );
        assert!(out.contains("command = cp test.h test.c ; $\n"));
        assert!(out.contains("build test.c: cp0 test.h\n"));
        assert!(out.contains("build all: phony"));
        assert!(out.contains("test.c"));
        assert!(out.contains("default all\n"));
    }

    #[test]
    fn test_search_resolves_sources_in_subdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/in.txt"), "data").unwrap();
        let (_, out) = build(
            dir.path(),
            "SEARCH on in.txt = sub ;\n\
             actions cp { cp $(>) $(<) }\n\
             cp app : in.txt ;\n\
             DEPENDS all : app ;\n",
        );
        assert!(out.contains("command = cp sub/in.txt app ; $\n"));
        assert!(out.contains("build app: cp0 sub/in.txt\n"));
    }

    #[test]
    fn test_directory_dependency_collapses_to_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("gen")).unwrap();
        let (_, out) = build(
            dir.path(),
            "MkDir gen ;\n\
             actions touch { touch $(<) }\n\
             touch out ;\n\
             DEPENDS out : gen ;\n\
             DEPENDS all : out ;\n",
        );
        assert!(out.contains("build out: touch0 || dirs\n"));
        assert!(out.contains("build dirs: phony | gen\n"));
    }

    #[test]
    fn test_header_scan_feeds_implicit_deps() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.c"), "#include \"x.h\"\nint main;\n").unwrap();
        std::fs::write(dir.path().join("x.h"), "").unwrap();
        let (_, out) = build(
            dir.path(),
            "HDRSCAN = \"#include \\\"(.*)\\\"\" ;\n\
             HDRRULE = HdrRule ;\n\
             actions cc { cc -c $(>) -o $(<) }\n\
             cc main.o : main.c ;\n\
             DEPENDS main.o : main.c ;\n\
             DEPENDS all : main.o ;\n",
        );
        assert!(out.contains("build main.o: cc0 main.c | x.h\n"));
    }

    #[test]
    fn test_include_directive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rules.jam"), "FROM_INCLUDE = yes ;\n").unwrap();
        let (jam, _) = build(
            dir.path(),
            "include rules.jam ;\n\
             actions touch { touch $(<) }\n\
             touch out ;\n",
        );
        // included assignments land in the outer scope's globals
        let mut state = jam.state;
        assert_eq!(state.get_var("FROM_INCLUDE"), vec!["yes".to_string()]);
    }

    #[test]
    fn test_include_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Jamfile"), "include missing.jam ;\n").unwrap();
        let mut jam = Jam::new(JamOptions {
            fs: Some(Arc::new(RealFs::rooted(dir.path()))),
            env: Some(Vec::new()),
            root_dir: Some(dir.path().display().to_string()),
            ..JamOptions::default()
        });
        assert!(matches!(jam.run(), Err(ExecError::IncludeFailed(_))));
    }

    #[test]
    fn test_env_overrides_split_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Jamfile"), "").unwrap();
        let mut jam = Jam::new(JamOptions {
            fs: Some(Arc::new(RealFs::rooted(dir.path()))),
            env: Some(Vec::new()),
            env_overrides: vec!["CC=gcc".to_string(), "OPT=a=b".to_string()],
            root_dir: Some(dir.path().display().to_string()),
            ..JamOptions::default()
        });
        jam.run().unwrap();
        assert_eq!(jam.state_mut().get_var("CC"), vec!["gcc".to_string()]);
        // split once: the second `=` stays in the value
        assert_eq!(jam.state_mut().get_var("OPT"), vec!["a=b".to_string()]);
    }

    #[test]
    fn test_preset_variables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Jamfile"), "").unwrap();
        let mut jam = Jam::new(JamOptions {
            fs: Some(Arc::new(RealFs::rooted(dir.path()))),
            env: Some(Vec::new()),
            root_dir: Some("/work/tree".to_string()),
            ..JamOptions::default()
        });
        assert_eq!(
            jam.state_mut().get_var("JAMFILE"),
            vec!["Jamfile".to_string()]
        );
        assert_eq!(
            jam.state_mut().get_var("NINJA_ROOTDIR"),
            vec!["/work/tree".to_string()]
        );
    }

    #[test]
    fn test_cycle_broken_between_includes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.h"), "").unwrap();
        std::fs::write(dir.path().join("b.h"), "").unwrap();
        let (jam, _) = build(
            dir.path(),
            "INCLUDES a.h : b.h ;\n\
             INCLUDES b.h : a.h ;\n\
             actions touch { touch $(<) }\n\
             touch out ;\n\
             DEPENDS out : a.h ;\n\
             DEPENDS all : out ;\n",
        );
        let state = jam.state;
        let a = state.targets.lookup("a.h").unwrap();
        let b = state.targets.lookup("b.h").unwrap();
        let a_to_b = state.targets.get(a).includes.contains(&b);
        let b_to_a = state.targets.get(b).includes.contains(&a);
        // exactly one edge of the cycle survives
        assert!(a_to_b != b_to_a);
    }

    #[test]
    fn test_build_step_backrefs_hold() {
        let dir = tempfile::tempdir().unwrap();
        let (jam, _) = build(
            dir.path(),
            "actions cp { cp $(>) $(<) }\n\
             cp one : src1 ;\n\
             cp two : src2 ;\n\
             actions post { post $(<) }\n\
             post two ;\n",
        );
        let state = jam.state;
        for (idx, step) in state.build_steps.iter().enumerate() {
            assert!(!step.targets.is_empty());
            for &tid in &step.targets {
                assert_eq!(state.targets.get(tid).build_step, Some(idx));
            }
        }
    }

    #[test]
    fn test_emitted_outputs_match_bound_step_targets() {
        let dir = tempfile::tempdir().unwrap();
        let (jam, out) = build(
            dir.path(),
            "actions cp { cp $(>) $(<) }\n\
             cp one : src1 ;\n\
             cp two : src2 ;\n\
             DEPENDS all : one two ;\n",
        );
        let state = jam.state;
        let mut expected: Vec<String> = Vec::new();
        for step in &state.build_steps {
            for &tid in &step.targets {
                if let Some(bn) = &state.targets.get(tid).boundname {
                    expected.push(bn.clone());
                }
            }
        }
        let emitted: Vec<&str> = out
            .lines()
            .filter(|l| l.starts_with("build ") && !l.contains(": phony"))
            .map(|l| l[6..].split(':').next().unwrap().trim())
            .collect();
        assert_eq!(emitted.len(), expected.len());
        for name in expected {
            assert!(emitted.contains(&name.as_str()), "missing {}", name);
        }
    }
}
