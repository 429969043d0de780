//! Document extraction boundary: turns source files into one plain-text document.
//!
//! PDFs are read page by page with `lopdf`; `.txt` and `.md` files pass through unchanged.
//! Directories are walked recursively in file-name order. A scanned PDF legitimately yields
//! empty text; deciding whether that is fatal belongs to the pipeline, not to extraction.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// File extensions accepted as course material.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

/// Errors raised while locating or reading source files.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// A directory could not be walked.
    #[error("failed to walk {path}: {source}")]
    Walk {
        /// Directory being walked.
        path: PathBuf,
        /// Underlying traversal failure.
        #[source]
        source: walkdir::Error,
    },
    /// The file is not a parseable PDF.
    #[error("failed to parse PDF {path}: {source}")]
    Pdf {
        /// File being parsed.
        path: PathBuf,
        /// Underlying parser failure.
        #[source]
        source: lopdf::Error,
    },
    /// The file type is not supported.
    #[error("unsupported file type: {0}")]
    Unsupported(PathBuf),
}

/// Expand `paths` into the ordered list of files to extract.
///
/// Files are kept in the order given; each directory contributes its supported files sorted
/// by name. Explicitly named files with an unsupported extension are rejected, while
/// unsupported files found inside directories are skipped.
pub fn collect_sources(paths: &[PathBuf]) -> Result<Vec<PathBuf>, DocumentError> {
    let mut sources = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.map_err(|source| DocumentError::Walk {
                    path: path.clone(),
                    source,
                })?;
                if entry.file_type().is_file() && is_supported(entry.path()) {
                    sources.push(entry.into_path());
                }
            }
        } else if is_supported(path) {
            sources.push(path.clone());
        } else {
            return Err(DocumentError::Unsupported(path.clone()));
        }
    }
    Ok(sources)
}

/// Extract the text of one file.
pub fn extract_text(path: &Path) -> Result<String, DocumentError> {
    match extension(path).as_deref() {
        Some("pdf") => {
            let bytes = std::fs::read(path).map_err(|source| DocumentError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            extract_pdf_text(&bytes).map_err(|source| DocumentError::Pdf {
                path: path.to_path_buf(),
                source,
            })
        }
        Some("txt" | "md") => std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        }),
        _ => Err(DocumentError::Unsupported(path.to_path_buf())),
    }
}

/// Extract text from in-memory PDF bytes, one page after another.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, lopdf::Error> {
    let document = lopdf::Document::load_mem(bytes)?;
    let pages: Vec<u32> = document.get_pages().keys().copied().collect();

    let mut text = String::new();
    for page in &pages {
        let page_text = match document.extract_text(&[*page]) {
            Ok(page_text) => page_text,
            Err(error) => {
                tracing::warn!(page = *page, error = %error, "Skipping unreadable PDF page");
                String::new()
            }
        };
        text.push_str(&page_text);
        if !page_text.is_empty() && !page_text.ends_with('\n') {
            text.push('\n');
        }
    }
    tracing::debug!(pages = pages.len(), chars = text.len(), "Extracted PDF text");
    Ok(text)
}

/// Expand, extract, and concatenate every source in order, one newline between files.
///
/// Files that yield no text are logged and skipped, so the result is empty only when every
/// source was empty.
pub fn load_documents(paths: &[PathBuf]) -> Result<String, DocumentError> {
    let sources = collect_sources(paths)?;
    let mut texts = Vec::with_capacity(sources.len());
    for source in &sources {
        let text = extract_text(source)?;
        if text.trim().is_empty() {
            tracing::warn!(path = %source.display(), "No extractable text; file skipped");
            continue;
        }
        tracing::info!(path = %source.display(), chars = text.chars().count(), "Loaded document");
        texts.push(text);
    }
    Ok(texts.join("\n"))
}

fn is_supported(path: &Path) -> bool {
    extension(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Document, Object, Stream, dictionary};

    fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let contents: Vec<String> = pages
            .iter()
            .map(|text| format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET"))
            .collect();
        pdf_with_contents(&contents)
    }

    fn pdf_with_contents(contents: &[String]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for content in contents {
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.clone().into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Contents" => content_id,
            });
            kids.push(Object::from(page_id));
        }

        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(contents.len() as i64),
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn pdf_pages_are_extracted_in_order() {
        let bytes = pdf_with_pages(&["Mitochondria", "Ribosomes"]);
        let text = extract_pdf_text(&bytes).unwrap();
        let first = text.find("Mitochondria").unwrap();
        let second = text.find("Ribosomes").unwrap();
        assert!(first < second);
    }

    #[test]
    fn unreadable_pdf_page_is_skipped() {
        let bytes = pdf_with_contents(&[
            "BT /F1 12 Tf 72 720 Td (Mitochondria) Tj ET".to_string(),
            "BT Tf ET".to_string(),
            "BT /F1 12 Tf 72 720 Td (Ribosomes) Tj ET".to_string(),
        ]);
        let text = extract_pdf_text(&bytes).unwrap();
        assert!(text.contains("Mitochondria"));
        assert!(text.contains("Ribosomes"));
        assert!(text.find("Mitochondria") < text.find("Ribosomes"));
    }

    #[test]
    fn invalid_pdf_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        let error = extract_text(&path).unwrap_err();
        assert!(matches!(error, DocumentError::Pdf { .. }));
        assert!(error.to_string().contains("broken.pdf"));
    }

    #[test]
    fn directories_expand_to_sorted_supported_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "second").unwrap();
        std::fs::write(dir.path().join("a.TXT"), "first").unwrap();
        std::fs::write(dir.path().join("notes.docx"), "ignored").unwrap();

        let sources = collect_sources(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = sources
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.TXT", "b.md"]);
    }

    #[test]
    fn explicit_unsupported_file_is_rejected() {
        let error = collect_sources(&[PathBuf::from("slides.pptx")]).unwrap_err();
        assert!(matches!(error, DocumentError::Unsupported(_)));
    }

    #[test]
    fn documents_concatenate_in_given_order_and_skip_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let week2 = dir.path().join("week2.txt");
        let week1 = dir.path().join("week1.md");
        let blank = dir.path().join("blank.txt");
        std::fs::write(&week2, "Week two").unwrap();
        std::fs::write(&week1, "Week one").unwrap();
        std::fs::write(&blank, "  \n").unwrap();

        let text = load_documents(&[week2, blank, week1]).unwrap();
        assert_eq!(text, "Week two\nWeek one");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let error = extract_text(Path::new("/nonexistent/course.txt")).unwrap_err();
        assert!(matches!(error, DocumentError::Io { .. }));
    }
}
