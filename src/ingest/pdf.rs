//! PDF 文本抽取：逐页取文本，页码从 1 开始

use std::path::Path;

use lopdf::Document;

pub fn extract_pages(path: &Path) -> Result<Vec<(u32, String)>, String> {
    let doc = Document::load(path).map_err(|e| format!("Failed to load PDF: {}", e))?;
    pages_of(&doc)
}

pub fn extract_pages_from_bytes(bytes: &[u8]) -> Result<Vec<(u32, String)>, String> {
    let doc = Document::load_mem(bytes).map_err(|e| format!("Failed to load PDF: {}", e))?;
    pages_of(&doc)
}

/// 单页抽取失败只跳过该页
fn pages_of(doc: &Document) -> Result<Vec<(u32, String)>, String> {
    if doc.is_encrypted() {
        return Err("encrypted PDF is not supported".to_string());
    }
    let pages = doc.get_pages();
    tracing::debug!(page_count = pages.len(), "extracting text from PDF");

    let mut out = Vec::with_capacity(pages.len());
    for page in pages.keys() {
        match doc.extract_text(&[*page]) {
            Ok(text) => out.push((*page, text)),
            Err(e) => tracing::warn!(page, error = %e, "failed to extract text from page, skipping"),
        }
    }
    Ok(out)
}

/// 测试用：生成每页一段文本的最小 PDF
#[cfg(test)]
pub(crate) fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
