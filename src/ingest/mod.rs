//! 文档导入：把 .txt / .md / .pdf 写入本地索引
//!
//! 文档 ID 取文件名（不含扩展名），同 ID 重复导入会替换旧内容。
//! 文本文件用换页符 `\x0c` 分页；PDF 逐页抽取，块上记录真实页码。

pub mod pdf;

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::core::QaError;
use crate::memory::RagIndex;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];
const PDF_EXTENSION: &str = "pdf";

/// 单个文件的导入结果
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub doc_id: String,
    pub chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    fn new(path: PathBuf, doc_id: String, result: Result<usize, String>) -> Self {
        match result {
            Ok(chunks) => Self {
                path,
                doc_id,
                chunks,
                error: None,
            },
            Err(e) => Self {
                path,
                doc_id,
                chunks: 0,
                error: Some(e),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub files: Vec<FileReport>,
    pub total_chunks: usize,
}

impl IngestReport {
    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.files.len() - self.succeeded()
    }

    pub fn push(&mut self, file: FileReport) {
        self.total_chunks += file.chunks;
        self.files.push(file);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocKind {
    Text,
    Pdf,
}

fn doc_kind(path: &Path) -> Option<DocKind> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    if ext == PDF_EXTENSION {
        Some(DocKind::Pdf)
    } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        Some(DocKind::Text)
    } else {
        None
    }
}

/// 文件名（不含扩展名）作为文档 ID
pub fn doc_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// 收集待导入文件：单个文件直接返回；目录递归（跳过隐藏项），按路径排序
fn collect_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .max_depth(10)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && doc_kind(e.path()).is_some())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// 抽取结果写入索引；没有任何文本时报错
async fn index_extracted(
    index: &RagIndex,
    doc_id: &str,
    kind: DocKind,
    bytes: Vec<u8>,
) -> Result<usize, String> {
    match kind {
        DocKind::Text => {
            let text = String::from_utf8(bytes).map_err(|_| "file is not valid UTF-8".to_string())?;
            if text.trim().is_empty() {
                return Err("no text extracted".to_string());
            }
            Ok(index.index_document(doc_id, &text).await)
        }
        DocKind::Pdf => {
            let pages = tokio::task::spawn_blocking(move || pdf::extract_pages_from_bytes(&bytes))
                .await
                .map_err(|e| e.to_string())??;
            if pages.iter().all(|(_, text)| text.trim().is_empty()) {
                return Err("no text extracted".to_string());
            }
            Ok(index.index_pages(doc_id, &pages).await)
        }
    }
}

/// 导入一段文本
pub async fn ingest_text(index: &RagIndex, doc_id: &str, text: &str) -> Result<usize, QaError> {
    let doc_id = doc_id.trim();
    if doc_id.is_empty() {
        return Err(QaError::Ingestion("empty document id".to_string()));
    }
    Ok(index.index_document(doc_id, text).await)
}

/// 导入上传的文件内容；类型由文件名后缀决定，失败记录在返回的 FileReport 中
pub async fn ingest_bytes(index: &RagIndex, file_name: &str, bytes: Vec<u8>) -> FileReport {
    // 只取文件名部分，上传名里的目录成分不参与 doc id
    let name = Path::new(file_name)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(file_name));
    let doc_id = doc_id_for(&name);

    let result = match doc_kind(&name) {
        _ if doc_id.trim().is_empty() => Err("missing file name".to_string()),
        Some(kind) => index_extracted(index, &doc_id, kind, bytes).await,
        None => Err("unsupported file type (expected .pdf, .txt or .md)".to_string()),
    };
    if let Err(e) = &result {
        tracing::warn!(file = %name.display(), error = %e, "upload not ingested");
    }
    FileReport::new(name, doc_id, result)
}

/// 导入文件或目录；单个文件失败不影响其他文件
pub async fn ingest_path(index: &RagIndex, path: &Path) -> Result<IngestReport, QaError> {
    if !path.exists() {
        return Err(QaError::Ingestion(format!("path not found: {}", path.display())));
    }
    if path.is_file() && doc_kind(path).is_none() {
        return Err(QaError::Ingestion(format!(
            "unsupported file type: {} (expected .pdf, .txt or .md)",
            path.display()
        )));
    }

    let mut report = IngestReport::default();
    for file in collect_files(path) {
        let doc_id = doc_id_for(&file);
        let result = match (doc_kind(&file), tokio::fs::read(&file).await) {
            (Some(kind), Ok(bytes)) => index_extracted(index, &doc_id, kind, bytes).await,
            (None, _) => Err("unsupported file type".to_string()),
            (_, Err(e)) => Err(e.to_string()),
        };
        if let Err(e) = &result {
            tracing::warn!(path = %file.display(), error = %e, "document not ingested");
        }
        report.push(FileReport::new(file, doc_id, result));
    }

    tracing::info!(
        path = %path.display(),
        files = report.files.len(),
        chunks = report.total_chunks,
        "ingestion finished"
    );
    Ok(report)
}

/// 只允许导入 root 之内的路径（符号链接与 `..` 先解析再比较）
pub async fn ingest_path_within(
    index: &RagIndex,
    root: &Path,
    path: &Path,
) -> Result<IngestReport, QaError> {
    let root = root
        .canonicalize()
        .map_err(|e| QaError::Ingestion(format!("documents directory unavailable: {}", e)))?;
    let requested = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let resolved = requested
        .canonicalize()
        .map_err(|_| QaError::Ingestion(format!("path not found: {}", path.display())))?;
    if !resolved.starts_with(&root) {
        return Err(QaError::Ingestion(format!(
            "path is outside the documents directory: {}",
            path.display()
        )));
    }
    ingest_path(index, &resolved).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::DocumentRetriever;

    #[tokio::test]
    async fn test_ingest_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alpha.txt"), "Ferris is the Rust mascot.").unwrap();
        std::fs::write(dir.path().join("beta.md"), "# Tokio\nAsync runtime.\x0cSecond page about timers.").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(dir.path().join("empty.txt"), "   ").unwrap();
        std::fs::create_dir(dir.path().join(".hidden")).unwrap();
        std::fs::write(dir.path().join(".hidden/secret.txt"), "hidden text").unwrap();

        let index = RagIndex::new(100, None);
        let report = ingest_path(&index, dir.path()).await.unwrap();

        let ids: Vec<_> = report.files.iter().map(|f| f.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta", "empty"]);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.total_chunks, 3);

        let hits = index.search("timers", 5).await.unwrap();
        assert_eq!(hits[0].source, "beta");
        assert_eq!(hits[0].page, Some(2));
    }

    #[tokio::test]
    async fn test_ingest_pdf_keeps_page_numbers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("rustbook.pdf"),
            pdf::sample_pdf(&["Ownership rules apply to every value.", "Lifetimes annotate references."]),
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.pdf"), "%PDF-1.5 truncated").unwrap();

        let index = RagIndex::new(100, None);
        let report = ingest_path(&index, dir.path()).await.unwrap();
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.total_chunks, 2);

        let hits = index.search("lifetimes", 5).await.unwrap();
        assert_eq!(hits[0].source, "rustbook");
        assert_eq!(hits[0].page, Some(2));
    }

    #[tokio::test]
    async fn test_ingest_single_file_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.md");
        std::fs::write(&file, "Chunk me.").unwrap();

        let index = RagIndex::new(100, None);
        let report = ingest_path(&index, &file).await.unwrap();
        assert_eq!(report.total_chunks, 1);

        assert!(ingest_path(&index, &dir.path().join("missing")).await.is_err());
        let doc = dir.path().join("paper.docx");
        std::fs::write(&doc, "PK").unwrap();
        assert!(matches!(
            ingest_path(&index, &doc).await,
            Err(QaError::Ingestion(_))
        ));
        assert!(ingest_text(&index, " ", "text").await.is_err());
    }

    #[tokio::test]
    async fn test_ingest_bytes() {
        let index = RagIndex::new(100, None);

        let ok = ingest_bytes(&index, "../../etc/guide.pdf", pdf::sample_pdf(&["Axum builds on tower."])).await;
        assert_eq!(ok.doc_id, "guide");
        assert_eq!(ok.path, PathBuf::from("guide.pdf"));
        assert_eq!(ok.chunks, 1);
        assert!(ok.error.is_none());

        let rejected = ingest_bytes(&index, "slides.pptx", vec![1, 2, 3]).await;
        assert_eq!(rejected.chunks, 0);
        assert!(rejected.error.unwrap().contains("unsupported"));

        let not_utf8 = ingest_bytes(&index, "notes.txt", vec![0xff, 0xfe, 0x00]).await;
        assert!(not_utf8.error.is_some());

        assert_eq!(index.stats().await, (1, 1));
    }

    #[tokio::test]
    async fn test_ingest_path_within_rejects_escapes() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "do not read").unwrap();
        let docs = tempfile::tempdir().unwrap();
        std::fs::create_dir(docs.path().join("papers")).unwrap();
        std::fs::write(docs.path().join("papers/intro.txt"), "Intro to Rust.").unwrap();

        let index = RagIndex::new(100, None);
        let report = ingest_path_within(&index, docs.path(), Path::new("papers"))
            .await
            .unwrap();
        assert_eq!(report.total_chunks, 1);

        for escape in [
            outside.path().join("secret.txt"),
            docs.path().join("../").join(outside.path().file_name().unwrap()),
        ] {
            assert!(matches!(
                ingest_path_within(&index, docs.path(), &escape).await,
                Err(QaError::Ingestion(_))
            ));
        }
        assert_eq!(index.stats().await, (1, 1));
    }
}
