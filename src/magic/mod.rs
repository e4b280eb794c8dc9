//! Magic-command parser
//!
//! Splits a cell into package directives and the code that should actually
//! run. Nothing is executed here.
//!
//! # Recognized lines
//!
//! ```text
//! %<mgr> install <specs> [-c <channel>]...    conda-like install
//! %pip install <specs>                        pip install
//! %<mgr> remove|uninstall <names>             conda-like removal
//! %pip uninstall <names>                      pip removal
//! %<mgr> list                                 list all packages
//! %pip list                                   list pip packages
//! ```
//!
//! Magics run in the order the cell gives them. Consecutive install lines
//! merge into a single [`MagicCommand::Install`] (one solve), and likewise
//! for removals.
//!
//! `<mgr>` is one of [`CONDA_ALIASES`]. A line is classified as a whole:
//! either it is a magic line (and contributes no runnable code) or it is a
//! run line. A magic that does not start its line is rejected with
//! [`MagicError::MixedLine`] rather than silently dropping the code before it.

use thiserror::Error;

/// Front-end names for the conda-like package manager
pub const CONDA_ALIASES: &[&str] = &["micromamba", "un", "mamba", "conda", "rattler"];

/// Substrings that make a pip install line unparseable
///
/// Networked, local-path and requirement-file installs are left alone.
pub const PIP_SKIP_MARKERS: &[&str] = &[
    "--index-url",
    "--extra-index-url",
    ".whl",
    "tar.gz",
    "http",
    "https",
    "git",
    "./",
    "-r",
];

/// pip flags that are accepted and dropped
pub const PIP_IGNORED_FLAGS: &[&str] = &["--upgrade", "--pre", "--no-cache-dir", "--user", "--no-deps"];

pub type MagicResult<T> = Result<T, MagicError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MagicError {
    /// A magic command shares its line with other code
    #[error("line {line}: magic command mixed with code is not idempotently parseable: {text:?}")]
    MixedLine { line: usize, text: String },
}

/// Which front end a magic targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Manager {
    CondaLike,
    Pip,
}

/// What a `list` magic asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// `%<mgr> list`: conda-like and pip packages
    All,
    /// `%pip list`: pip packages only
    Pip,
}

/// Accumulated install directives, in line order, duplicates kept
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallDirectives {
    pub channels: Vec<String>,
    pub specs: Vec<String>,
    pub pip_specs: Vec<String>,
}

impl InstallDirectives {
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty() && self.pip_specs.is_empty()
    }
}

/// Accumulated uninstall directives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UninstallDirectives {
    pub specs: Vec<String>,
    pub pip_specs: Vec<String>,
}

impl UninstallDirectives {
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty() && self.pip_specs.is_empty()
    }
}

/// One step of a cell's magics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MagicCommand {
    Install(InstallDirectives),
    Uninstall(UninstallDirectives),
    List(ListKind),
    /// A pip install line that was recognized but not parsed
    Skipped(String),
}

/// Result of parsing a cell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCell {
    /// Magics to run, in cell order
    pub commands: Vec<MagicCommand>,
    /// Every install directive of the cell
    pub install: InstallDirectives,
    pub uninstall: UninstallDirectives,
    pub list: Option<ListKind>,
    /// Non-magic lines, newline-joined, in their original order
    pub run: String,
    /// pip install lines that were recognized but not parsed
    pub skipped: Vec<String>,
}

impl ParsedCell {
    pub fn list_requested(&self) -> bool {
        self.list.is_some()
    }

    /// True if the cell had no magic lines at all
    pub fn is_plain(&self) -> bool {
        self.commands.is_empty()
    }

    fn push_install(&mut self, channels: Vec<String>, specs: Vec<String>, pip_specs: Vec<String>) {
        self.install.channels.extend(channels.iter().cloned());
        self.install.specs.extend(specs.iter().cloned());
        self.install.pip_specs.extend(pip_specs.iter().cloned());

        if let Some(MagicCommand::Install(last)) = self.commands.last_mut() {
            last.channels.extend(channels);
            last.specs.extend(specs);
            last.pip_specs.extend(pip_specs);
        } else {
            self.commands.push(MagicCommand::Install(InstallDirectives {
                channels,
                specs,
                pip_specs,
            }));
        }
    }

    fn push_uninstall(&mut self, manager: Manager, names: Vec<String>) {
        let target = match manager {
            Manager::CondaLike => &mut self.uninstall.specs,
            Manager::Pip => &mut self.uninstall.pip_specs,
        };
        target.extend(names.iter().cloned());

        if !matches!(self.commands.last(), Some(MagicCommand::Uninstall(_))) {
            self.commands
                .push(MagicCommand::Uninstall(UninstallDirectives::default()));
        }
        if let Some(MagicCommand::Uninstall(last)) = self.commands.last_mut() {
            match manager {
                Manager::CondaLike => last.specs.extend(names),
                Manager::Pip => last.pip_specs.extend(names),
            }
        }
    }
}

/// Classification of one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    Install { manager: Manager, args: &'a str },
    Uninstall { manager: Manager, args: &'a str },
    List(ListKind),
    Run,
}

/// Parse a cell
pub fn parse(code: &str) -> MagicResult<ParsedCell> {
    let mut cell = ParsedCell::default();
    let mut run_lines = Vec::new();

    for (idx, line) in code.split('\n').enumerate() {
        match classify_line(idx + 1, line)? {
            LineKind::Install {
                manager: Manager::CondaLike,
                args,
            } => {
                let (channels, specs) = parse_conda_args(args);
                cell.push_install(channels, specs, Vec::new());
            }
            LineKind::Install {
                manager: Manager::Pip,
                args,
            } => match parse_pip_args(args) {
                Some(specs) => cell.push_install(Vec::new(), Vec::new(), specs),
                None => {
                    tracing::debug!(line = idx + 1, "skipping unparseable pip install line");
                    cell.skipped.push(line.to_string());
                    cell.commands.push(MagicCommand::Skipped(line.to_string()));
                }
            },
            LineKind::Uninstall { manager, args } => {
                let names = args.split_whitespace().map(str::to_string).collect();
                cell.push_uninstall(manager, names);
            }
            LineKind::List(kind) => {
                // A full listing subsumes a pip-only one.
                cell.list = match (cell.list, kind) {
                    (Some(ListKind::All), _) | (_, ListKind::All) => Some(ListKind::All),
                    _ => Some(ListKind::Pip),
                };
                cell.commands.push(MagicCommand::List(kind));
            }
            LineKind::Run => run_lines.push(line),
        }
    }

    // Lines like "%conda install" with nothing after them do nothing.
    cell.commands.retain(|command| match command {
        MagicCommand::Install(directives) => !directives.is_empty(),
        MagicCommand::Uninstall(directives) => !directives.is_empty(),
        _ => true,
    });
    cell.run = run_lines.join("\n");
    Ok(cell)
}

/// Classify a single line; `line_no` is only used for diagnostics
pub fn classify_line(line_no: usize, line: &str) -> MagicResult<LineKind<'_>> {
    let trimmed = line.trim();

    for name in CONDA_ALIASES.iter().copied().chain(std::iter::once("pip")) {
        if trimmed == format!("%{} list", name) {
            let kind = if name == "pip" {
                ListKind::Pip
            } else {
                ListKind::All
            };
            return Ok(LineKind::List(kind));
        }
    }

    if let Some((manager, args)) = find_command(line_no, line, &install_commands())? {
        return Ok(LineKind::Install { manager, args });
    }
    if let Some((manager, args)) = find_command(line_no, line, &uninstall_commands())? {
        return Ok(LineKind::Uninstall { manager, args });
    }

    Ok(LineKind::Run)
}

fn install_commands() -> Vec<(String, Manager)> {
    CONDA_ALIASES
        .iter()
        .map(|name| (format!("%{} install", name), Manager::CondaLike))
        .chain(std::iter::once(("%pip install".to_string(), Manager::Pip)))
        .collect()
}

fn uninstall_commands() -> Vec<(String, Manager)> {
    CONDA_ALIASES
        .iter()
        .flat_map(|name| {
            [
                (format!("%{} remove", name), Manager::CondaLike),
                (format!("%{} uninstall", name), Manager::CondaLike),
            ]
        })
        .chain(std::iter::once(("%pip uninstall".to_string(), Manager::Pip)))
        .collect()
}

/// Locate the first command of `commands` in `line`, returning the text after it
fn find_command<'a>(
    line_no: usize,
    line: &'a str,
    commands: &[(String, Manager)],
) -> MagicResult<Option<(Manager, &'a str)>> {
    for (command, manager) in commands {
        let Some(pos) = line.find(command.as_str()) else {
            continue;
        };

        let after = &line[pos + command.len()..];
        // "%pip installx" is not an install command.
        if after.chars().next().is_some_and(|c| !c.is_whitespace()) {
            continue;
        }

        if !line[..pos].trim().is_empty() {
            return Err(MagicError::MixedLine {
                line: line_no,
                text: line.to_string(),
            });
        }

        return Ok(Some((*manager, after)));
    }
    Ok(None)
}

/// Split conda-like arguments into (channels, specs)
pub fn parse_conda_args(args: &str) -> (Vec<String>, Vec<String>) {
    let mut channels = Vec::new();
    let mut specs = Vec::new();
    let mut tokens = args.split_whitespace().peekable();

    while let Some(token) = tokens.next() {
        if token == "-c" {
            if let Some(channel) = tokens.next_if(|next| !next.starts_with('-')) {
                channels.push(channel.to_string());
                continue;
            }
        }
        specs.push(token.to_string());
    }

    (channels, specs)
}

/// Parse pip arguments; `None` if the line hits a skip marker
pub fn parse_pip_args(args: &str) -> Option<Vec<String>> {
    if PIP_SKIP_MARKERS.iter().any(|marker| args.contains(marker)) {
        return None;
    }

    Some(
        args.split_whitespace()
            .filter(|token| !PIP_IGNORED_FLAGS.contains(token))
            .map(str::to_string)
            .collect(),
    )
}
