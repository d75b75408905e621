use std::path::Path;

use mime::Mime;
use reqwest::{Client, header};

use crate::error::{Error, ErrorKind};
use crate::pdf;

/// Fetches the text content of a source.
///
/// `http` and `https` identifiers are downloaded, `file://` identifiers and
/// anything else are read from the local file system. PDF documents are
/// recognized by content type, by a `.pdf` extension or by their signature
/// and have their text extracted. Everything else must be UTF-8 text.
#[derive(Clone, Debug, Default)]
pub(crate) struct Loader {
    client: Client,
}

impl Loader {
    pub async fn load(&self, identifier: &str) -> Result<String, Error> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(Error::new(ErrorKind::InvalidSource, "empty identifier"));
        }

        if identifier.starts_with("http://") || identifier.starts_with("https://")
        {
            self.fetch(identifier).await
        } else {
            let path = identifier.strip_prefix("file://").unwrap_or(identifier);
            read_file(Path::new(path)).await
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, Error> {
        debug!("fetching {url}");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|err| Error::new(ErrorKind::Load, err.to_string()))?;

        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);
        let path = resp.url().path().to_owned();
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| Error::new(ErrorKind::Load, err.to_string()))?;

        let Some(content_type) = content_type else {
            return decode(url, is_pdf_path(&path), bytes.to_vec()).await;
        };
        let mime = content_type.parse::<Mime>().ok();
        let is_pdf = mime.as_ref().is_some_and(is_pdf_mime)
            || (is_pdf_path(&path) && !mime.as_ref().is_some_and(is_textual));
        if is_pdf || pdf::has_signature(&bytes) {
            return pdf::extract_text(url.to_owned(), bytes.to_vec()).await;
        }
        if !mime.as_ref().is_some_and(is_textual) {
            return Err(Error::new(
                ErrorKind::Unsupported,
                format!("content type `{content_type}` is not supported"),
            ));
        }
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            Error::new(
                ErrorKind::Unsupported,
                format!("{url} is not UTF-8 text"),
            )
        })
    }
}

fn is_textual(mime: &Mime) -> bool {
    mime.type_() == mime::TEXT
        || mime.subtype() == mime::JSON
        || mime.subtype() == mime::XML
        || mime.suffix() == Some(mime::JSON)
        || mime.suffix() == Some(mime::XML)
        || mime.subtype().as_str() == "markdown"
}

fn is_pdf_mime(mime: &Mime) -> bool {
    mime.essence_str() == mime::APPLICATION_PDF.essence_str()
}

fn is_pdf_path(path: &str) -> bool {
    Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Decodes a body whose type is only known from its name and content.
async fn decode(
    name: &str,
    named_pdf: bool,
    bytes: Vec<u8>,
) -> Result<String, Error> {
    if named_pdf || pdf::has_signature(&bytes) {
        return pdf::extract_text(name.to_owned(), bytes).await;
    }
    String::from_utf8(bytes).map_err(|_| {
        Error::new(ErrorKind::Unsupported, format!("{name} is not UTF-8 text"))
    })
}

async fn read_file(path: &Path) -> Result<String, Error> {
    debug!("reading {}", path.display());
    let bytes = tokio::fs::read(path).await.map_err(|err| {
        Error::new(ErrorKind::Load, format!("{}: {err}", path.display()))
    })?;
    let name = path.display().to_string();
    decode(&name, is_pdf_path(&name), bytes).await
}
