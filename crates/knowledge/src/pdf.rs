use lopdf::Document;

use crate::error::{Error, ErrorKind};

/// Returns `true` if `bytes` carries the PDF file signature.
#[inline]
pub(crate) fn has_signature(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

/// Extracts the text of every page, in page order.
///
/// Parsing is CPU bound, so it runs on the blocking thread pool.
pub(crate) async fn extract_text(
    name: String,
    bytes: Vec<u8>,
) -> Result<String, Error> {
    tokio::task::spawn_blocking(move || extract_pages(&name, &bytes))
        .await
        .map_err(|err| Error::new(ErrorKind::Load, err.to_string()))?
}

fn extract_pages(name: &str, bytes: &[u8]) -> Result<String, Error> {
    let doc = Document::load_mem(bytes).map_err(|err| {
        Error::new(ErrorKind::Load, format!("{name}: invalid PDF: {err}"))
    })?;
    if doc.is_encrypted() {
        return Err(Error::new(
            ErrorKind::Unsupported,
            format!("{name} is encrypted"),
        ));
    }

    let pages = doc.get_pages();
    debug!("extracting {} pages from {name}", pages.len());

    let mut text = String::new();
    for &page_number in pages.keys() {
        let page = doc.extract_text(&[page_number]).map_err(|err| {
            Error::new(
                ErrorKind::Load,
                format!("{name}: page {page_number}: {err}"),
            )
        })?;
        let page = page.trim();
        if page.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(page);
    }

    if text.is_empty() {
        return Err(Error::new(
            ErrorKind::Unsupported,
            format!("{name} has no extractable text"),
        ));
    }
    Ok(text)
}

/// Builds a single page PDF showing `line` in Helvetica.
#[cfg(test)]
pub(crate) fn sample(line: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{Dictionary, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", "Font".into()),
        ("Subtype", "Type1".into()),
        ("BaseFont", "Helvetica".into()),
    ]));
    let resources = Dictionary::from_iter(vec![(
        "Font",
        Dictionary::from_iter(vec![("F1", font_id.into())]).into(),
    )]);
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![100.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(line)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        Dictionary::new(),
        content.encode().unwrap(),
    ));
    let page_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", "Page".into()),
        ("Parent", pages_id.into()),
        ("Contents", content_id.into()),
        ("Resources", resources.into()),
        (
            "MediaBox",
            vec![0.into(), 0.into(), 595.into(), 842.into()].into(),
        ),
    ]));
    let pages = Dictionary::from_iter(vec![
        ("Type", "Pages".into()),
        ("Kids", vec![page_id.into()].into()),
        ("Count", 1.into()),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", "Catalog".into()),
        ("Pages", pages_id.into()),
    ]));
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
