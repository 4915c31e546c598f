use crate::error::AppError;
use crate::tools::dependency_resolver::DependencyReference;
use crate::utils::line_ending_handler::split_lines;
use crate::utils::path_utils::{base_name, relative_slash_path};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchingLine {
    pub line_number: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMatch {
    pub absolute_path: PathBuf,
    pub relative_path: String,
    pub lines: Vec<MatchingLine>,
}

impl FileMatch {
    pub fn file_name(&self) -> &str {
        base_name(&self.relative_path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderMatch {
    pub name: String,
    pub children: Vec<SearchMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchMatch {
    Folder(FolderMatch),
    File(FileMatch),
}

impl SearchMatch {
    /// Matching lines in this subtree.
    pub fn count(&self) -> usize {
        match self {
            SearchMatch::File(file) => file.lines.len(),
            SearchMatch::Folder(folder) => folder.children.iter().map(SearchMatch::count).sum(),
        }
    }

    /// Merges every folder whose only child is a folder into one node
    /// named `"<parent> / <child>"`, down the whole tree.
    pub fn collapse_chains(self) -> SearchMatch {
        match self {
            SearchMatch::File(file) => SearchMatch::File(file),
            SearchMatch::Folder(mut folder) => {
                while folder.children.len() == 1 && matches!(folder.children[0], SearchMatch::Folder(_)) {
                    if let Some(SearchMatch::Folder(child)) = folder.children.pop() {
                        folder.name = format!("{} / {}", folder.name, child.name);
                        folder.children = child.children;
                    }
                }
                folder.children = folder.children.into_iter().map(SearchMatch::collapse_chains).collect();
                SearchMatch::Folder(folder)
            }
        }
    }
}

/// One candidate source file: where it lives and its path inside the
/// folder currently being grouped.
#[derive(Debug, Clone)]
struct Candidate {
    absolute_path: PathBuf,
    relative_path: String,
}

/// Lines of `content` containing `query` literally, numbered from 1.
pub fn matching_lines(content: &str, query: &str) -> Vec<MatchingLine> {
    split_lines(content)
        .into_iter()
        .enumerate()
        .filter(|(_, line)| line.contains(query))
        .map(|(idx, line)| MatchingLine {
            line_number: idx + 1,
            text: line.to_string(),
        })
        .collect()
}

fn read_matches(path: &Path, query: &str) -> Result<Vec<MatchingLine>, AppError> {
    if !path.is_file() {
        return Err(AppError::FileNotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path).map_err(|e| AppError::file_read(path, e))?;
    Ok(matching_lines(&String::from_utf8_lossy(&bytes), query))
}

/// Groups candidates by their first path segment, recursing until a path
/// has no `/` left. Folders come first, then files, both in discovery
/// order; branches without matches are dropped.
fn group_candidates(candidates: Vec<Candidate>, query: &str) -> Result<Vec<SearchMatch>, AppError> {
    let mut folders: Vec<(String, Vec<Candidate>)> = Vec::new();
    let mut files: Vec<SearchMatch> = Vec::new();

    for candidate in candidates {
        match candidate.relative_path.split_once('/') {
            None => {
                let lines = read_matches(&candidate.absolute_path, query)?;
                if !lines.is_empty() {
                    files.push(SearchMatch::File(FileMatch {
                        absolute_path: candidate.absolute_path,
                        relative_path: candidate.relative_path,
                        lines,
                    }));
                }
            }
            Some((head, rest)) => {
                let nested = Candidate {
                    absolute_path: candidate.absolute_path,
                    relative_path: rest.to_string(),
                };
                match folders.iter_mut().find(|(name, _)| name == head) {
                    Some((_, bucket)) => bucket.push(nested),
                    None => folders.push((head.to_string(), vec![nested])),
                }
            }
        }
    }

    let mut grouped = Vec::with_capacity(folders.len() + files.len());
    for (name, bucket) in folders {
        let children = group_candidates(bucket, query)?;
        if !children.is_empty() {
            grouped.push(SearchMatch::Folder(FolderMatch { name, children }));
        }
    }
    grouped.extend(files);
    Ok(grouped)
}

/// Source files under `repo_dir`, sorted by name within each directory.
fn list_candidates(repo_dir: &Path, extension: &str) -> Result<Vec<Candidate>, AppError> {
    let mut candidates = Vec::new();
    for entry in WalkDir::new(repo_dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(repo_dir).to_path_buf();
            AppError::file_read(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(relative_path) = relative_slash_path(entry.path(), repo_dir) else {
            continue;
        };
        if relative_path.ends_with(extension) {
            candidates.push(Candidate {
                absolute_path: entry.into_path(),
                relative_path,
            });
        }
    }
    Ok(candidates)
}

/// Searches the cached source tree of every dependency for `query`.
///
/// Returns one collapsed folder per dependency with at least one hit. Any
/// missing directory or unreadable file aborts the whole search; there are
/// no partial results.
#[instrument(skip(references), fields(dependencies = references.len()))]
pub fn search_repositories(
    cache_root: &Path,
    references: &[DependencyReference],
    query: &str,
    extension: &str,
) -> Result<Vec<SearchMatch>, AppError> {
    if cfg!(windows) {
        return Err(AppError::UnsupportedPlatform(std::env::consts::OS));
    }
    if !cache_root.is_dir() {
        return Err(AppError::CacheDirectoryNotFound(cache_root.to_path_buf()));
    }

    let mut results = Vec::new();
    for reference in references {
        let repo_name = reference.cache_dir_name();
        let repo_dir = cache_root.join(&repo_name);
        if !repo_dir.is_dir() {
            return Err(AppError::RepositoryNotFound(repo_name));
        }

        let candidates = list_candidates(&repo_dir, extension)?;
        debug!(repo = %repo_name, candidates = candidates.len(), "Scanning repository");
        let children = group_candidates(candidates, query)?;
        if !children.is_empty() {
            let folder = SearchMatch::Folder(FolderMatch {
                name: reference.name.clone(),
                children,
            });
            results.push(folder.collapse_chains());
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(name: &str, commit: &str) -> DependencyReference {
        DependencyReference {
            name: name.to_string(),
            resolved_commit: commit.to_string(),
        }
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn folder(name: &str, children: Vec<SearchMatch>) -> SearchMatch {
        SearchMatch::Folder(FolderMatch {
            name: name.to_string(),
            children,
        })
    }

    fn file(relative: &str, lines: &[usize]) -> SearchMatch {
        SearchMatch::File(FileMatch {
            absolute_path: PathBuf::from("/cache").join(relative),
            relative_path: relative.to_string(),
            lines: lines
                .iter()
                .map(|n| MatchingLine {
                    line_number: *n,
                    text: format!("line {}", n),
                })
                .collect(),
        })
    }

    fn name_of(node: &SearchMatch) -> &str {
        match node {
            SearchMatch::Folder(f) => &f.name,
            SearchMatch::File(f) => f.file_name(),
        }
    }

    fn assert_counts_consistent(node: &SearchMatch) {
        match node {
            SearchMatch::File(f) => assert!(!f.lines.is_empty()),
            SearchMatch::Folder(f) => {
                assert!(!f.children.is_empty());
                assert_eq!(node.count(), f.children.iter().map(SearchMatch::count).sum::<usize>());
                f.children.iter().for_each(assert_counts_consistent);
            }
        }
    }

    #[test]
    fn matching_is_literal_and_case_sensitive() {
        let lines = matching_lines("// TODO: a\nlet todo = 1;\r\nfinal x = 'TODO(.*)';", "TODO");
        let numbers: Vec<usize> = lines.iter().map(|l| l.line_number).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert_eq!(lines[1].text, "final x = 'TODO(.*)';");
        assert_eq!(matching_lines("a.b", ".*").len(), 0);
    }

    #[test]
    fn single_file_in_nested_folders() {
        let cache = tempfile::tempdir().unwrap();
        let mut content = vec!["import 'x.dart';"; 4];
        content.push("  // TODO remove");
        write(cache.path(), "core_lib-abc123/lib/a/b.dart", &content.join("\n"));

        let results = search_repositories(cache.path(), &[reference("core_lib", "abc123")], "TODO", ".dart").unwrap();

        assert_eq!(results.len(), 1);
        let SearchMatch::Folder(top) = &results[0] else { panic!("expected folder") };
        assert_eq!(top.name, "core_lib / lib / a");
        assert_eq!(results[0].count(), 1);
        let SearchMatch::File(b) = &top.children[0] else { panic!("expected file") };
        assert_eq!(b.file_name(), "b.dart");
        assert_eq!(b.relative_path, "b.dart");
        assert_eq!(b.lines, vec![MatchingLine { line_number: 5, text: "  // TODO remove".to_string() }]);
        assert!(b.absolute_path.ends_with("core_lib-abc123/lib/a/b.dart"));
    }

    #[test]
    fn folders_precede_files_and_empty_branches_are_pruned() {
        let cache = tempfile::tempdir().unwrap();
        let repo = "core_lib-abc123";
        write(cache.path(), &format!("{repo}/lib/0_top.dart"), "TODO top");
        write(cache.path(), &format!("{repo}/lib/b/one.dart"), "TODO\nTODO");
        write(cache.path(), &format!("{repo}/lib/a/two.dart"), "TODO");
        write(cache.path(), &format!("{repo}/lib/empty/none.dart"), "nothing here");
        write(cache.path(), &format!("{repo}/lib/a/notes.txt"), "TODO not dart");
        write(cache.path(), &format!("{repo}/README.md"), "TODO");

        let results = search_repositories(cache.path(), &[reference("core_lib", "abc123")], "TODO", ".dart").unwrap();

        let SearchMatch::Folder(top) = &results[0] else { panic!("expected folder") };
        assert_eq!(top.name, "core_lib / lib");
        let names: Vec<&str> = top.children.iter().map(name_of).collect();
        assert_eq!(names, vec!["a", "b", "0_top.dart"]);
        assert_eq!(results[0].count(), 4);
        assert_counts_consistent(&results[0]);
    }

    #[test]
    fn repositories_without_hits_are_omitted() {
        let cache = tempfile::tempdir().unwrap();
        write(cache.path(), "core_lib-abc/lib/a.dart", "TODO");
        write(cache.path(), "ds-def/lib/b.dart", "nothing");

        let refs = [reference("ds", "def"), reference("core_lib", "abc")];
        let results = search_repositories(cache.path(), &refs, "TODO", ".dart").unwrap();

        let names: Vec<&str> = results.iter().map(name_of).collect();
        assert_eq!(names, vec!["core_lib / lib"]);
    }

    #[test]
    fn missing_repository_aborts_whole_search() {
        let cache = tempfile::tempdir().unwrap();
        write(cache.path(), "core_lib-abc/lib/a.dart", "TODO");

        let refs = [reference("core_lib", "abc"), reference("ghost", "000")];
        let err = search_repositories(cache.path(), &refs, "TODO", ".dart").unwrap_err();
        assert!(matches!(err, AppError::RepositoryNotFound(ref name) if name == "ghost-000"));
    }

    #[test]
    fn missing_cache_root_is_reported() {
        let cache = tempfile::tempdir().unwrap();
        let root = cache.path().join("nope");
        let err = search_repositories(&root, &[], "TODO", ".dart").unwrap_err();
        assert!(matches!(err, AppError::CacheDirectoryNotFound(_)));
    }

    #[test]
    fn collapse_merges_whole_chains_only() {
        let tree = folder(
            "repo",
            vec![folder(
                "lib",
                vec![folder("src", vec![file("a.dart", &[1]), folder("x", vec![folder("y", vec![file("b.dart", &[2])])])])],
            )],
        );

        let collapsed = tree.collapse_chains();

        let SearchMatch::Folder(top) = &collapsed else { panic!("expected folder") };
        assert_eq!(top.name, "repo / lib / src");
        let names: Vec<&str> = top.children.iter().map(name_of).collect();
        assert_eq!(names, vec!["a.dart", "x / y"]);
    }

    #[test]
    fn collapse_is_idempotent() {
        let tree = folder(
            "repo",
            vec![folder("lib", vec![folder("a", vec![file("a.dart", &[1, 2])]), folder("b", vec![folder("c", vec![file("c.dart", &[3])])])])],
        );
        let once = tree.collapse_chains();
        let twice = once.clone().collapse_chains();
        assert_eq!(once, twice);
        assert_eq!(once.count(), 3);
    }

    #[test]
    fn folder_with_single_file_child_is_not_collapsed() {
        let tree = folder("lib", vec![file("a.dart", &[1])]);
        assert_eq!(tree.clone().collapse_chains(), tree);
    }
}
