//! Finding the configuration file, and seeding a first one.

use std::{
    env,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "MAILPROBE_CONFIG";

const FILE_NAME: &str = "mailprobe.toml";

/// Written when no configuration exists, as a starting point.
pub const EXAMPLE_CONFIG: &str = r#"# mailprobe configuration
debug = false
continue_on_errors = false

[[tests]]
name = "test example"
should_send = true
smtp_server = "smtp.example.com"
smtp_port = 25
send_from = "user@example.com"
send_to = "user@example.com"
sender_login = "user@example.com"
# Prompted for when left out.
sender_password = "password"
wait_for = 2
should_receive = true
imap_server = "imap.example.com"
imap_port = 993
imap_login = "user@example.com"
imap_password = "password"
leave_message = false
"#;

/// Where to look for a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Given on the command line; when set, nothing else is tried.
    pub explicit: Option<PathBuf>,
    /// From [`CONFIG_ENV`].
    pub from_env: Option<PathBuf>,
    pub home: Option<PathBuf>,
    pub working_dir: PathBuf,
}

impl Discovery {
    /// Look-up locations for this process.
    #[must_use]
    pub fn for_process(explicit: Option<PathBuf>) -> Self {
        Self {
            explicit,
            from_env: env::var_os(CONFIG_ENV)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
            home: env::var_os("HOME")
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
            working_dir: PathBuf::from("."),
        }
    }

    /// Paths tried, in order.
    #[must_use]
    pub fn candidates(&self) -> Vec<PathBuf> {
        if let Some(path) = self.explicit.as_ref().or(self.from_env.as_ref()) {
            return vec![path.clone()];
        }

        let mut candidates = Vec::with_capacity(3);
        if let Some(home) = &self.home {
            candidates.push(home.join(".config").join("mailprobe").join(FILE_NAME));
            candidates.push(home.join(".mailprobe.toml"));
        }
        candidates.push(self.working_dir.join(FILE_NAME));
        candidates
    }

    /// The first candidate that exists.
    #[must_use]
    pub fn locate(&self) -> Option<PathBuf> {
        self.candidates().into_iter().find(|path| path.is_file())
    }

    /// Where an example configuration is seeded when nothing was found.
    #[must_use]
    pub fn example_path(&self) -> Option<PathBuf> {
        self.home
            .as_ref()
            .map(|home| home.join(".config").join("mailprobe").join(FILE_NAME))
    }
}

/// Write [`EXAMPLE_CONFIG`] to `path`, creating parent directories.
///
/// Returns `false`, leaving the file untouched, if it already exists.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created.
pub fn write_example(path: &Path) -> io::Result<bool> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(EXAMPLE_CONFIG.as_bytes())?;
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use mailprobe_common::config::{ProbeConfig, RunConfig};
    use pretty_assertions::assert_eq;

    use super::*;

    fn discovery(root: &Path) -> Discovery {
        Discovery {
            explicit: None,
            from_env: None,
            home: Some(root.join("home")),
            working_dir: root.join("work"),
        }
    }

    #[test]
    fn search_order() {
        let root = Path::new("/tmp/probe");
        assert_eq!(
            discovery(root).candidates(),
            vec![
                root.join("home/.config/mailprobe/mailprobe.toml"),
                root.join("home/.mailprobe.toml"),
                root.join("work/mailprobe.toml"),
            ]
        );
    }

    #[test]
    fn explicit_path_wins() {
        let mut discovery = discovery(Path::new("/tmp/probe"));
        discovery.from_env = Some(PathBuf::from("/etc/env.toml"));
        discovery.explicit = Some(PathBuf::from("/etc/cli.toml"));

        assert_eq!(discovery.candidates(), vec![PathBuf::from("/etc/cli.toml")]);

        discovery.explicit = None;
        assert_eq!(discovery.candidates(), vec![PathBuf::from("/etc/env.toml")]);
    }

    #[test]
    fn locates_first_existing() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = discovery(dir.path());

        assert_eq!(discovery.locate(), None);

        fs::create_dir_all(dir.path().join("work")).unwrap();
        fs::write(dir.path().join("work/mailprobe.toml"), "").unwrap();
        assert_eq!(
            discovery.locate(),
            Some(dir.path().join("work/mailprobe.toml"))
        );

        fs::create_dir_all(dir.path().join("home")).unwrap();
        fs::write(dir.path().join("home/.mailprobe.toml"), "").unwrap();
        assert_eq!(
            discovery.locate(),
            Some(dir.path().join("home/.mailprobe.toml"))
        );
    }

    #[test]
    fn example_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = discovery(dir.path()).example_path().unwrap();

        assert!(write_example(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), EXAMPLE_CONFIG);

        fs::write(&path, "# edited").unwrap();
        assert!(!write_example(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "# edited");
    }

    #[test]
    fn example_is_a_valid_configuration() {
        let config = ProbeConfig::from_toml(EXAMPLE_CONFIG).expect("example should parse");
        let run = RunConfig::from(config);

        assert_eq!(run.tests.len(), 1);
        assert!(run.tests[0].missing_fields().is_empty());
        assert_eq!(run.tests[0].outbound.secret.expose(), "password");
    }
}
