//! Phases 1-3: metacharacter rejection, allowlist, path confinement.
//!
//! The pipeline consumes the canonical form from [`crate::normalize`] and
//! either fails fast with a specific error or hands back the accepted token
//! vector. The executor passes that vector as argv to a direct spawn; no
//! shell ever sees the string, so quoting is not a defense and is not
//! treated as one.

use aho_corasick::{AhoCorasick, MatchKind};

use crate::path::{PathMode, PathValidator};
use crate::{SandboxError, normalize_command};

/// Commands treated as interpreters for the inline-code gate.
const INTERPRETERS: &[&str] = &["python", "python3", "node", "ruby", "perl"];

/// Flags that hand an interpreter inline source or stdin.
const INLINE_FLAGS: &[&str] = &["-c", "-e", "--eval", "--exec", "-"];

/// `find` options whose following token is a pattern or number, not a path.
const FIND_VALUE_OPTIONS: &[&str] = &[
    "-name", "-iname", "-path", "-ipath", "-regex", "-type", "-maxdepth", "-mindepth", "-perm",
    "-size", "-mtime", "-newer",
];

/// git subcommands the sandbox will execute.
const GIT_ALLOWED_SUBCOMMANDS: &[&str] = &["status", "diff", "log", "add", "commit", "branch"];

/// Four-phase command validation pipeline.
#[derive(Debug, Clone)]
pub struct CommandSandbox {
    paths: PathValidator,
    metacharacters: AhoCorasick,
}

impl CommandSandbox {
    /// Compile the metacharacter matcher once; shared across turns.
    pub fn new(paths: PathValidator) -> Result<Self, SandboxError> {
        let metacharacters = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&paths.policy().blocked_metacharacters)
            .map_err(|e| SandboxError::InvalidPolicy {
                message: format!("metacharacter matcher: {e}"),
            })?;
        Ok(Self {
            paths,
            metacharacters,
        })
    }

    #[must_use]
    pub fn paths(&self) -> &PathValidator {
        &self.paths
    }

    /// Run all four phases over a raw command string.
    ///
    /// Returns the accepted argv. The string passed between phases is the
    /// canonical form; no phase re-examines the raw input.
    pub fn validate(&self, raw: &str) -> Result<Vec<String>, SandboxError> {
        // Phase 0: normalization.
        let canonical = normalize_command(raw)?;

        // Phase 1: metacharacter rejection.
        if let Some(found) = self.metacharacters.find(&canonical) {
            return Err(SandboxError::BlockedMetacharacter {
                token: canonical[found.range()].to_string(),
            });
        }

        // Phase 2: tokenize and allowlist.
        let tokens = tokenize(&canonical)?;
        let Some(command) = tokens.first() else {
            return Err(SandboxError::CommandNotAllowed {
                command: String::new(),
            });
        };
        let policy = self.paths.policy();
        if policy.command_blocklist.contains(command.as_str())
            || !policy.command_allowlist.contains(command.as_str())
        {
            return Err(SandboxError::CommandNotAllowed {
                command: command.clone(),
            });
        }
        if INTERPRETERS.contains(&command.as_str()) {
            if let Some(flag) = tokens[1..]
                .iter()
                .find(|t| INLINE_FLAGS.contains(&t.as_str()))
            {
                return Err(SandboxError::InlineInterpreter {
                    command: command.clone(),
                    flag: flag.clone(),
                });
            }
        }

        // Phase 3: argument path confinement.
        if command == "git" {
            self.confine_git(&tokens)?;
        } else if policy.path_arg_commands.contains(command.as_str()) {
            self.confine_path_args(command, &tokens)?;
        }

        Ok(tokens)
    }

    /// Submit every path-shaped argument to the path validator.
    ///
    /// `cp`/`mv` destinations are validated in write mode, which also applies
    /// the blocked-extension policy and closes the rename-to-executable class.
    fn confine_path_args(&self, command: &str, tokens: &[String]) -> Result<(), SandboxError> {
        let mut path_args: Vec<&String> = Vec::new();
        let mut skip_next = false;
        let mut seen_pattern = false;
        for token in &tokens[1..] {
            if skip_next {
                skip_next = false;
                continue;
            }
            if token.starts_with('-') {
                if command == "find" && FIND_VALUE_OPTIONS.contains(&token.as_str()) {
                    skip_next = true;
                }
                continue;
            }
            // grep's first non-option argument is the pattern.
            if command == "grep" && !seen_pattern {
                seen_pattern = true;
                continue;
            }
            path_args.push(token);
        }

        let moves_file = matches!(command, "cp" | "mv");
        let count = path_args.len();
        for (i, arg) in path_args.into_iter().enumerate() {
            let mode = if moves_file && i + 1 == count && count >= 2 {
                PathMode::Write
            } else {
                PathMode::Read
            };
            self.paths.validate(arg, mode)?;
        }
        Ok(())
    }

    /// Subcommand gate for git; network-touching subcommands never run.
    fn confine_git(&self, tokens: &[String]) -> Result<(), SandboxError> {
        let Some(subcommand) = tokens.get(1) else {
            return Err(SandboxError::CommandNotAllowed {
                command: "git".to_string(),
            });
        };
        if !GIT_ALLOWED_SUBCOMMANDS.contains(&subcommand.as_str()) {
            return Err(SandboxError::CommandNotAllowed {
                command: format!("git {subcommand}"),
            });
        }
        if subcommand == "add" {
            for token in &tokens[2..] {
                if !token.starts_with('-') {
                    self.paths.validate(token, PathMode::Read)?;
                }
            }
        }
        Ok(())
    }
}

/// Split by ASCII whitespace honoring single/double quotes.
///
/// No backslash escapes and no variable expansion; the grammar is
/// deliberately smaller than any shell's.
fn tokenize(input: &str) -> Result<Vec<String>, SandboxError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for ch in input.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    in_token = true;
                }
                c if c.is_ascii_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }
    if quote.is_some() {
        return Err(SandboxError::CommandNotAllowed {
            command: "<unterminated quote>".to_string(),
        });
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
