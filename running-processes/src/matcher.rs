use std::collections::HashSet;
use std::path::Path;

use depkit_command_line::command_line_to_argv;

use crate::MatchError;
use crate::ProcessDefinition;
use crate::ProcessSnapshot;
use crate::ProcessTable;
use crate::RunningProcessInfo;
use crate::definition::has_exe_extension;
use crate::definition::image_stem;
use crate::definition::strip_exe;

/// Running processes matching any of `definitions`, sorted by description.
///
/// A process matching several definitions is reported once per definition.
/// Processes whose executable cannot be resolved are skipped.
pub fn match_processes(
    definitions: &[ProcessDefinition],
    table: &dyn ProcessTable,
) -> Result<Vec<RunningProcessInfo>, MatchError> {
    if definitions.is_empty() {
        return Err(MatchError::NoDefinitions);
    }
    let wanted: HashSet<String> = definitions
        .iter()
        .map(ProcessDefinition::image_stem)
        .collect();
    let candidates: Vec<Candidate> = table
        .snapshot()
        .into_iter()
        .filter(|process| is_wanted(process, &wanted))
        .filter_map(|process| Candidate::inspect(process, table))
        .collect();
    tracing::trace!(
        candidates = candidates.len(),
        "inspected running processes"
    );

    let mut matches = Vec::new();
    for definition in definitions {
        for candidate in &candidates {
            if !candidate.matches(definition) {
                continue;
            }
            let info = RunningProcessInfo {
                pid: candidate.process.pid,
                description: describe(definition, candidate, table),
                file_path: candidate.argv[0].clone(),
                arguments: candidate.argv[1..].to_vec(),
                username: candidate.process.user.clone(),
                process_name: candidate.process_name.clone(),
            };
            if definition.accepts(&info) {
                matches.push(info);
            }
        }
    }
    matches.sort_by_cached_key(|info| info.description.to_lowercase());
    Ok(matches)
}

fn is_wanted(process: &ProcessSnapshot, wanted: &HashSet<String>) -> bool {
    wanted.contains(&image_stem(&process.name))
        || process
            .exe
            .as_deref()
            .is_some_and(|exe| wanted.contains(&image_stem(&exe.to_string_lossy())))
}

struct Candidate {
    process: ProcessSnapshot,
    process_name: String,
    /// `argv[0]` is always the resolved executable path.
    argv: Vec<String>,
}

impl Candidate {
    fn inspect(mut process: ProcessSnapshot, table: &dyn ProcessTable) -> Option<Self> {
        if process.command_line.is_none() {
            process.command_line = table.command_line(process.pid);
        }
        let Some(argv) = recover_argv(&process) else {
            tracing::debug!(
                pid = process.pid,
                name = %process.name,
                "skipping process whose executable cannot be resolved"
            );
            return None;
        };
        Some(Self {
            process_name: strip_exe(&process.name).to_string(),
            process,
            argv,
        })
    }

    fn matches(&self, definition: &ProcessDefinition) -> bool {
        if definition.is_path() {
            return self.argv[0].to_lowercase() == definition.name.to_lowercase();
        }
        let stem = definition.image_stem();
        image_stem(&self.process.name) == stem || image_stem(&self.argv[0]) == stem
    }
}

/// The process's argument vector with the resolved executable in front.
fn recover_argv(process: &ProcessSnapshot) -> Option<Vec<String>> {
    let exe = process.exe.as_deref()?.to_string_lossy().into_owned();
    let Some(line) = process.command_line.as_deref() else {
        // A pre-split vector came straight from the OS, so only its first
        // element needs replacing.
        let mut argv = process.argv.clone();
        match argv.first_mut() {
            Some(first) => *first = exe,
            None => argv.push(exe),
        }
        return Some(argv);
    };

    let mut argv = command_line_to_argv(line).unwrap_or_default();
    let Some(first) = argv.first() else {
        return Some(vec![exe]);
    };
    if names_an_image(first, &exe) {
        argv[0] = exe;
    } else {
        argv.insert(0, exe);
    }
    Some(argv)
}

fn names_an_image(first: &str, exe: &str) -> bool {
    has_exe_extension(first) || image_stem(first) == image_stem(exe)
}

/// Definition, then file, then live process description, then image name.
fn describe(
    definition: &ProcessDefinition,
    candidate: &Candidate,
    table: &dyn ProcessTable,
) -> String {
    if let Some(description) = definition.explicit_description() {
        return description.to_string();
    }
    table
        .file_description(Path::new(&candidate.argv[0]))
        .filter(|description| !description.trim().is_empty())
        .or_else(|| {
            table
                .process_description(candidate.process.pid)
                .filter(|description| !description.trim().is_empty())
        })
        .unwrap_or_else(|| candidate.process_name.clone())
}
