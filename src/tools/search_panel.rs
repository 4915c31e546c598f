use crate::config::Config;
use crate::error::AppError;
use crate::tools::dependency_resolver::load_dependency_references;
use crate::tools::repo_search_tool::{search_repositories, SearchMatch};
use crate::tools::result_renderer::{folder_ids, render_results, total_count};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Deserialize)]
pub struct SearchReposParams {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleFolderParams {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenFileParams {
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelView {
    pub query: Option<String>,
    pub loading: bool,
    pub total: usize,
    pub markup: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileLocation {
    pub path: PathBuf,
    /// 1-based; `None` opens the file at the top.
    pub line: Option<usize>,
}

enum SearchTicket {
    Cleared(PanelView),
    Started { generation: u64, query: String },
}

#[derive(Debug, Default)]
struct PanelState {
    query: Option<String>,
    loading: bool,
    results: Option<Vec<SearchMatch>>,
    collapsed: HashSet<String>,
    generation: u64,
}

impl PanelState {
    fn view(&self) -> PanelView {
        let results = self.results.as_deref().unwrap_or_default();
        PanelView {
            query: self.query.clone(),
            loading: self.loading,
            total: total_count(results),
            markup: if self.results.is_some() {
                render_results(results, &self.collapsed)
            } else {
                String::new()
            },
        }
    }
}

/// State of one search panel: the last query, its results and which
/// folders the user collapsed.
///
/// Overlapping searches resolve by submission order: each search takes a
/// generation number and only the newest one may store its results.
#[derive(Debug)]
pub struct SearchPanel {
    config: Arc<Config>,
    state: TokioMutex<PanelState>,
}

impl SearchPanel {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            state: TokioMutex::new(PanelState::default()),
        }
    }

    pub async fn view(&self) -> PanelView {
        self.state.lock().await.view()
    }

    #[instrument(skip(self, params), fields(query = %params.query))]
    pub async fn submit_search(&self, params: &SearchReposParams) -> Result<PanelView, AppError> {
        match self.begin_search(&params.query).await {
            SearchTicket::Cleared(view) => Ok(view),
            SearchTicket::Started { generation, query } => {
                let outcome = self.run_search(&query).await;
                self.finish_search(generation, query, outcome).await
            }
        }
    }

    async fn begin_search(&self, raw_query: &str) -> SearchTicket {
        let query = raw_query.trim().to_string();
        let mut state = self.state.lock().await;
        state.generation += 1;
        state.collapsed.clear();
        state.results = None;
        if query.is_empty() {
            debug!("Empty query, clearing results");
            state.query = None;
            state.loading = false;
            return SearchTicket::Cleared(state.view());
        }
        state.query = Some(query.clone());
        state.loading = true;
        SearchTicket::Started {
            generation: state.generation,
            query,
        }
    }

    async fn finish_search(
        &self,
        generation: u64,
        query: String,
        outcome: Result<Vec<SearchMatch>, AppError>,
    ) -> Result<PanelView, AppError> {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            info!(generation, latest = state.generation, "Discarding results of a superseded search");
            let results = outcome?;
            return Ok(PanelView {
                query: Some(query),
                loading: false,
                total: total_count(&results),
                markup: render_results(&results, &HashSet::new()),
            });
        }

        state.loading = false;
        match outcome {
            Ok(results) => {
                info!(total = total_count(&results), repositories = results.len(), "Search finished");
                state.results = Some(results);
                Ok(state.view())
            }
            Err(e) => {
                warn!(error = %e, "Search failed");
                state.results = None;
                Err(e)
            }
        }
    }

    async fn run_search(&self, query: &str) -> Result<Vec<SearchMatch>, AppError> {
        if cfg!(windows) {
            return Err(AppError::UnsupportedPlatform(std::env::consts::OS));
        }
        let references = load_dependency_references(&self.config).await?;
        let cache_root = self.config.pub_cache_dir.clone();
        let extension = self.config.source_extension.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || search_repositories(&cache_root, &references, &query, &extension))
            .await
            .map_err(search_task_failed)?
    }

    /// Flips one folder between expanded and collapsed. Ids that are not
    /// folders of the current tree are ignored.
    #[instrument(skip(self, params), fields(id = %params.id))]
    pub async fn toggle_folder(&self, params: &ToggleFolderParams) -> PanelView {
        let mut state = self.state.lock().await;
        let known = state
            .results
            .as_deref()
            .is_some_and(|results| folder_ids(results).iter().any(|id| id == &params.id));
        if !known {
            debug!("Toggle for unknown folder ignored");
        } else if !state.collapsed.remove(&params.id) {
            state.collapsed.insert(params.id.clone());
        }
        state.view()
    }

    #[instrument(skip(self, params), fields(link = %params.link))]
    pub async fn open_file(&self, params: &OpenFileParams) -> Result<FileLocation, AppError> {
        let location = parse_file_link(&params.link);
        if !tokio::fs::try_exists(&location.path).await.unwrap_or(false) {
            return Err(AppError::FileNotFound(location.path));
        }
        Ok(location)
    }
}

fn search_task_failed(err: tokio::task::JoinError) -> AppError {
    AppError::SearchTaskFailed(err.to_string())
}

/// Decodes a `path:line` link. The line is taken after the last `:`; a
/// missing, non-numeric or non-positive line opens the file at the top.
/// A suffix holding a path separator belongs to the path.
pub fn parse_file_link(link: &str) -> FileLocation {
    match link.rsplit_once(':') {
        Some((path, line)) if !line.is_empty() && !line.contains(['/', '\\']) => FileLocation {
            path: PathBuf::from(path),
            line: line.parse::<usize>().ok().filter(|n| *n > 0),
        },
        _ => FileLocation {
            path: PathBuf::from(link),
            line: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_DEPENDENCY_URL_PREFIX as PREFIX;
    use std::path::Path;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn fixture() -> (tempfile::TempDir, Arc<Config>) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_tests(dir.path());
        let app = &config.workspace_roots[0];
        write(&app.join("pubspec.yaml"), &format!("dependencies:\n  core_lib:\n    git:\n{}core_lib\n", PREFIX));
        write(&app.join("pubspec.lock"), "packages:\n  core_lib:\n    description:\n      resolved-ref: \"abc123\"\n");
        write(
            &config.pub_cache_dir.join("core_lib-abc123/lib/a/b.dart"),
            "import 'x.dart';\n\nclass B {}\n\n// TODO: split\n",
        );
        (dir, Arc::new(config))
    }

    #[tokio::test]
    async fn search_stores_and_renders_results() {
        let (_dir, config) = fixture();
        let panel = SearchPanel::new(config);

        let view = panel.submit_search(&SearchReposParams { query: "  TODO ".to_string() }).await.unwrap();

        assert_eq!(view.query.as_deref(), Some("TODO"));
        assert!(!view.loading);
        assert_eq!(view.total, 1);
        assert!(view.markup.contains("core_lib / lib / a"));
        assert!(view.markup.contains("b.dart:5"));
        assert_eq!(panel.view().await, view);
    }

    #[tokio::test]
    async fn whitespace_query_clears_without_scanning() {
        let (dir, config) = fixture();
        let panel = SearchPanel::new(config.clone());
        panel.submit_search(&SearchReposParams { query: "TODO".to_string() }).await.unwrap();

        // Removing the inputs proves no scan happens for an empty query.
        std::fs::remove_dir_all(dir.path().join("pub-cache")).unwrap();
        let view = panel.submit_search(&SearchReposParams { query: " \t ".to_string() }).await.unwrap();

        assert_eq!(view.query, None);
        assert_eq!(view.total, 0);
        assert!(view.markup.is_empty());
    }

    #[tokio::test]
    async fn failed_search_clears_results_and_reports_cause() {
        let (dir, config) = fixture();
        let panel = SearchPanel::new(config);
        panel.submit_search(&SearchReposParams { query: "TODO".to_string() }).await.unwrap();

        std::fs::remove_dir_all(dir.path().join("pub-cache/git/core_lib-abc123")).unwrap();
        let err = panel.submit_search(&SearchReposParams { query: "class".to_string() }).await.unwrap_err();

        assert!(matches!(err, AppError::RepositoryNotFound(ref r) if r == "core_lib-abc123"));
        let view = panel.view().await;
        assert!(!view.loading);
        assert_eq!(view.total, 0);
        assert!(view.markup.is_empty());
    }

    #[tokio::test]
    async fn superseded_search_does_not_overwrite_newer_state() {
        let (_dir, config) = fixture();
        let panel = SearchPanel::new(config);

        let SearchTicket::Started { generation: older, query: older_query } = panel.begin_search("class").await else {
            panic!("expected a started search");
        };
        let SearchTicket::Started { generation: newer, query: newer_query } = panel.begin_search("TODO").await else {
            panic!("expected a started search");
        };

        let newer_outcome = panel.run_search(&newer_query).await;
        let newer_view = panel.finish_search(newer, newer_query, newer_outcome).await.unwrap();
        let older_outcome = panel.run_search(&older_query).await;
        let older_view = panel.finish_search(older, older_query, older_outcome).await.unwrap();

        assert_eq!(older_view.query.as_deref(), Some("class"));
        assert_eq!(older_view.total, 1);
        assert!(older_view.markup.contains("class B {}"));
        assert_eq!(panel.view().await, newer_view);
        assert_eq!(panel.view().await.query.as_deref(), Some("TODO"));
    }

    #[tokio::test]
    async fn toggle_flips_known_folders_only() {
        let (_dir, config) = fixture();
        let panel = SearchPanel::new(config);
        panel.submit_search(&SearchReposParams { query: "TODO".to_string() }).await.unwrap();

        let collapsed = panel.toggle_folder(&ToggleFolderParams { id: "0".to_string() }).await;
        assert!(collapsed.markup.contains(r#"<div content-id="0" class="hidden">"#));

        let unchanged = panel.toggle_folder(&ToggleFolderParams { id: "7".to_string() }).await;
        assert_eq!(unchanged, collapsed);

        let expanded = panel.toggle_folder(&ToggleFolderParams { id: "0".to_string() }).await;
        assert!(expanded.markup.contains(r#"<div content-id="0">"#));
    }

    #[tokio::test]
    async fn open_file_checks_existence() {
        let (dir, config) = fixture();
        let panel = SearchPanel::new(config.clone());
        let file = config.pub_cache_dir.join("core_lib-abc123/lib/a/b.dart");

        let location = panel
            .open_file(&OpenFileParams { link: format!("{}:5", file.display()) })
            .await
            .unwrap();
        assert_eq!(location, FileLocation { path: file, line: Some(5) });

        let missing = dir.path().join("missing.dart");
        let err = panel
            .open_file(&OpenFileParams { link: format!("{}:1", missing.display()) })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::FileNotFound(_)));
    }

    #[test]
    fn file_links_split_on_last_colon() {
        assert_eq!(
            parse_file_link("/cache/a.dart:12"),
            FileLocation { path: PathBuf::from("/cache/a.dart"), line: Some(12) }
        );
        assert_eq!(
            parse_file_link("C:/cache/a.dart:3"),
            FileLocation { path: PathBuf::from("C:/cache/a.dart"), line: Some(3) }
        );
        assert_eq!(parse_file_link("/cache/a.dart"), FileLocation { path: PathBuf::from("/cache/a.dart"), line: None });
        assert_eq!(parse_file_link("/cache/a.dart:0").line, None);
    }

    #[test]
    fn non_numeric_line_opens_file_at_top() {
        assert_eq!(
            parse_file_link("/cache/a.dart:abc"),
            FileLocation { path: PathBuf::from("/cache/a.dart"), line: None }
        );
        assert_eq!(
            parse_file_link("/cache/dir:x/a.dart"),
            FileLocation { path: PathBuf::from("/cache/dir:x/a.dart"), line: None }
        );
    }

    #[tokio::test]
    async fn open_file_ignores_non_numeric_line() {
        let (dir, config) = fixture();
        let panel = SearchPanel::new(config);
        let file = dir.path().join("plain.dart");
        write(&file, "x");

        let location = panel.open_file(&OpenFileParams { link: format!("{}:abc", file.display()) }).await.unwrap();
        assert_eq!(location, FileLocation { path: file, line: None });
    }

    #[tokio::test]
    async fn panicked_search_task_is_a_task_failure() {
        let err = tokio::task::spawn_blocking(|| -> Vec<SearchMatch> { panic!("scan aborted") })
            .await
            .map_err(search_task_failed)
            .unwrap_err();
        assert!(matches!(err, AppError::SearchTaskFailed(_)));
    }
}
