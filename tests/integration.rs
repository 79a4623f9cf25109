use std::path::{Path, PathBuf};
use std::sync::Arc;

use codeseek_core::completion::{CompletionPipeline, CompletionService, DocumentSnapshot};
use codeseek_core::config::{CompletionConfig, CompletionMode, Config};
use codeseek_index::indexer::{CodeIndexer, FileOutcome};
use codeseek_index::project::Project;
use codeseek_index::store::{ChunkPredicate, CodeStore};
use codeseek_llm::mock::MockProvider;
use tokio_util::sync::CancellationToken;

/// Keyword-count embedding: similar topics land close together.
fn keyword_embedding(text: &str) -> Vec<f32> {
    #[allow(clippy::cast_precision_loss)]
    let count = |needle: &str| text.matches(needle).count() as f32;
    vec![count("add"), count("log"), count("fetch"), 1.0]
}

fn write(root: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, contents).unwrap();
    path
}

fn completion_config(mode: CompletionMode) -> CompletionConfig {
    CompletionConfig {
        mode,
        debounce_ms: 0,
        ..CompletionConfig::default()
    }
}

struct Workspace {
    _dir: tempfile::TempDir,
    root: PathBuf,
    store: CodeStore,
    provider: Arc<MockProvider>,
    indexer: CodeIndexer<MockProvider>,
}

fn workspace(responses: Vec<String>) -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("shop-app");
    write(
        &root,
        "src/math.ts",
        "export function add(a: number, b: number) { return a + b; }",
    );
    write(&root, "src/log.js", "export const log = (msg) => console.log(msg);");
    write(&root, "src/api.py", "def fetch(url):\n    return requests.get(url)\n");
    write(&root, "node_modules/left-pad/index.js", "module.exports = add;");

    let store = CodeStore::in_memory();
    let provider =
        Arc::new(MockProvider::with_responses(responses).with_embed_fn(keyword_embedding));
    let indexer = CodeIndexer::new(
        store.clone(),
        Arc::clone(&provider),
        vec![root.clone()],
        Config::default().indexer_config(),
    )
    .unwrap();
    Workspace {
        _dir: dir,
        root,
        store,
        provider,
        indexer,
    }
}

fn service(ws: &Workspace, mode: CompletionMode) -> CompletionService<MockProvider> {
    CompletionService::new(CompletionPipeline::new(
        Arc::clone(&ws.provider),
        ws.store.clone(),
        vec![ws.root.clone()],
        completion_config(mode),
    ))
}

#[tokio::test]
async fn index_then_complete_with_retrieved_context() {
    let ws = workspace(vec!["```typescript\nadd(total, 1);\n```".into()]);
    let report = ws.indexer.index_all().await.unwrap();
    assert_eq!(report.files_total, 3);
    assert_eq!(report.projects[0].project, "shop-app");
    assert_eq!(report.projects[0].files_indexed, 3);

    let main = write(&ws.root, "src/main.ts", "import { add } from './math';\nconst next = ");
    let svc = service(&ws, CompletionMode::Retrieval);
    let doc = DocumentSnapshot::new(
        main,
        "import { add } from './math';\nconst next = ",
        1,
        13,
    );
    let out = svc.request(doc, CancellationToken::new()).await.unwrap();
    assert_eq!(out.text, "add(total, 1);");

    let prompts = ws.provider.prompts();
    assert_eq!(prompts.len(), 1);
    let prompt = &prompts[0];
    assert!(prompt.contains("// From file: math.ts"));
    let math = prompt.find("math.ts").unwrap();
    let api = prompt.find("api.py").unwrap();
    assert!(math < api, "nearest chunk comes first");
    assert!(!prompt.contains("left-pad"));
}

#[tokio::test]
async fn watcher_style_update_is_visible_to_retrieval() {
    let ws = workspace(vec!["one".into(), "two".into()]);
    ws.indexer.index_all().await.unwrap();

    let log = ws.root.join("src/log.js");
    std::fs::write(&log, "export function fetchAndLog(url) { log(fetch(url)); }").unwrap();
    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
    std::fs::OpenOptions::new()
        .write(true)
        .open(&log)
        .unwrap()
        .set_modified(later)
        .unwrap();

    assert_eq!(
        ws.indexer.reindex_file(&log).await.unwrap(),
        FileOutcome::Indexed { chunks: 1 }
    );

    let table = ws
        .store
        .open(&Project::from_root(&ws.root))
        .await
        .unwrap()
        .unwrap();
    let rows = table
        .query_where(&ChunkPredicate::file(log.to_string_lossy()))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].text.contains("fetchAndLog"));

    let svc = service(&ws, CompletionMode::Retrieval);
    let doc = DocumentSnapshot::new(ws.root.join("src/new.js"), "fetch(", 0, 6);
    svc.request(doc, CancellationToken::new()).await;
    let prompt = &ws.provider.prompts()[0];
    assert!(prompt.contains("fetchAndLog"));
    assert!(!prompt.contains("console.log"));
}

#[tokio::test]
async fn rerun_is_idempotent_and_skips_unchanged_files() {
    let ws = workspace(Vec::new());
    ws.indexer.index_all().await.unwrap();
    let embeds = ws.provider.embed_calls();

    let report = ws.indexer.index_all().await.unwrap();
    assert_eq!(report.projects[0].files_unchanged, 3);
    assert_eq!(report.projects[0].chunks_created, 0);
    assert_eq!(ws.provider.embed_calls(), embeds);
}

#[tokio::test]
async fn local_context_mode_works_without_an_index() {
    let ws = workspace(vec!["for (const item of items) {\n  total += item.price;\n}".into()]);
    let svc = service(&ws, CompletionMode::LocalContext);
    let text = "let total = 0;\nfor (const item of items) {\n  \n}\nreturn total;";
    let doc = DocumentSnapshot::new(ws.root.join("src/cart.ts"), text, 2, 2);

    let out = svc.request(doc, CancellationToken::new()).await.unwrap();
    assert_eq!(out.text, "total += item.price;");
    assert_eq!(ws.provider.embed_calls(), 0);
    assert!(ws.provider.prompts()[0].contains("  <CURSOR>\n}"));
}

#[tokio::test]
async fn cancelled_trigger_yields_nothing() {
    let ws = workspace(vec!["unused".into()]);
    ws.indexer.index_all().await.unwrap();
    let svc = service(&ws, CompletionMode::Retrieval);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let doc = DocumentSnapshot::new(ws.root.join("src/main.ts"), "add(", 0, 4);
    assert!(svc.request(doc, cancel).await.is_none());
    assert_eq!(ws.provider.generate_calls(), 0);
}
