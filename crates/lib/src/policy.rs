//! Allow-list validator: decides whether a (command, args) pair may run.
//!
//! Matching is byte-exact. No shell interpretation, path resolution, trimming or case folding
//! happens here; any normalization would widen what the allow-list admits.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::CommandCatalog;

/// Why a request was refused. Crosses the bridge as data, never as a transport fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    CommandNotAllowed,
    ArgumentNotAllowed,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::CommandNotAllowed => "command_not_allowed",
            ViolationKind::ArgumentNotAllowed => "argument_not_allowed",
        }
    }
}

/// A policy rejection: the kind plus the offending command or argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub command: String,
    /// The offending value: the command name, or the first disallowed argument.
    pub subject: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ViolationKind::CommandNotAllowed => {
                write!(f, "command '{}' is not allowed", self.subject)
            }
            ViolationKind::ArgumentNotAllowed => write!(
                f,
                "argument '{}' is not allowed for command '{}'",
                self.subject, self.command
            ),
        }
    }
}

impl std::error::Error for Violation {}

/// Check `command` and every element of `args` against the catalog.
/// Fails fast on the first argument that is not in the command's allowed set.
pub fn validate(command: &str, args: &[String], catalog: &CommandCatalog) -> Result<(), Violation> {
    let spec = catalog.find(command).ok_or_else(|| Violation {
        kind: ViolationKind::CommandNotAllowed,
        command: command.to_string(),
        subject: command.to_string(),
    })?;
    if let Some(bad) = args.iter().find(|a| !spec.allows(a)) {
        return Err(Violation {
            kind: ViolationKind::ArgumentNotAllowed,
            command: command.to_string(),
            subject: bad.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CommandSpec;
    use proptest::prelude::*;

    fn catalog() -> CommandCatalog {
        CommandCatalog::new(vec![
            CommandSpec::new("ls", "list files", &["-l", "-a", "/tmp"]),
            CommandSpec::new("uptime", "load average", &[]),
        ])
        .unwrap()
    }

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn allowed_subset_is_accepted() {
        assert_eq!(validate("ls", &args(&["-l", "/tmp"]), &catalog()), Ok(()));
        assert_eq!(validate("ls", &args(&[]), &catalog()), Ok(()));
        assert_eq!(validate("ls", &args(&["-l", "-l", "-a"]), &catalog()), Ok(()));
    }

    #[test]
    fn disallowed_argument_is_reported() {
        let v = validate("ls", &args(&["-l", "-R"]), &catalog()).unwrap_err();
        assert_eq!(v.kind, ViolationKind::ArgumentNotAllowed);
        assert_eq!(v.subject, "-R");
        assert_eq!(v.to_string(), "argument '-R' is not allowed for command 'ls'");
    }

    #[test]
    fn first_bad_argument_wins() {
        let v = validate("ls", &args(&["-x", "-y"]), &catalog()).unwrap_err();
        assert_eq!(v.subject, "-x");
    }

    #[test]
    fn unknown_command_is_rejected() {
        let v = validate("rm", &args(&[]), &catalog()).unwrap_err();
        assert_eq!(v.kind, ViolationKind::CommandNotAllowed);
        assert_eq!(v.to_string(), "command 'rm' is not allowed");
    }

    #[test]
    fn matching_is_case_sensitive_and_untrimmed() {
        assert_eq!(
            validate("LS", &args(&[]), &catalog()).unwrap_err().kind,
            ViolationKind::CommandNotAllowed
        );
        assert_eq!(
            validate("ls", &args(&[" -l"]), &catalog()).unwrap_err().kind,
            ViolationKind::ArgumentNotAllowed
        );
        assert_eq!(
            validate("ls", &args(&["/tmp/"]), &catalog()).unwrap_err().kind,
            ViolationKind::ArgumentNotAllowed
        );
    }

    #[test]
    fn empty_command_is_not_allowed() {
        assert_eq!(
            validate("", &args(&[]), &catalog()).unwrap_err().kind,
            ViolationKind::CommandNotAllowed
        );
    }

    #[test]
    fn violation_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&ViolationKind::ArgumentNotAllowed).unwrap(),
            "\"argument_not_allowed\""
        );
        assert_eq!(ViolationKind::CommandNotAllowed.as_str(), "command_not_allowed");
    }

    proptest! {
        #[test]
        fn commands_outside_catalog_always_rejected(
            cmd in "[a-zA-Z0-9_./-]{0,12}",
            argv in proptest::collection::vec(".{0,8}", 0..5),
        ) {
            prop_assume!(cmd != "ls" && cmd != "uptime");
            let v = validate(&cmd, &argv, &catalog()).unwrap_err();
            prop_assert_eq!(v.kind, ViolationKind::CommandNotAllowed);
        }

        #[test]
        fn no_arg_command_accepts_only_empty_list(
            argv in proptest::collection::vec(".{0,8}", 1..5),
        ) {
            prop_assert!(validate("uptime", &[], &catalog()).is_ok());
            let v = validate("uptime", &argv, &catalog()).unwrap_err();
            prop_assert_eq!(v.kind, ViolationKind::ArgumentNotAllowed);
        }

        #[test]
        fn accepted_iff_every_arg_is_member(
            argv in proptest::collection::vec(
                prop_oneof![
                    Just("-l".to_string()),
                    Just("-a".to_string()),
                    Just("/tmp".to_string()),
                    "[-/a-zA-Z]{1,4}",
                ],
                0..6,
            ),
        ) {
            let allowed = ["-l", "-a", "/tmp"];
            let all_members = argv.iter().all(|a| allowed.contains(&a.as_str()));
            let result = validate("ls", &argv, &catalog());
            prop_assert_eq!(result.is_ok(), all_members);
            if let Err(v) = result {
                prop_assert_eq!(v.kind, ViolationKind::ArgumentNotAllowed);
                prop_assert!(!allowed.contains(&v.subject.as_str()));
            }
        }
    }
}
