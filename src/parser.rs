// Document text extraction for uploaded files.
//
// Files are parsed in memory from the multipart upload. Tables in DOCX
// files are flattened into [TABLE] blocks so chunking keeps them together.

use docx_rs::{
    read_docx, DocumentChild, Paragraph, ParagraphChild, RunChild, Table, TableCellContent,
    TableChild, TableRowChild,
};

use crate::error::ApiError;

pub const SUPPORTED_EXTENSIONS: [&str; 5] = [".txt", ".md", ".pdf", ".docx", ".doc"];

/// Lowercased extension of a filename, including the dot
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rfind('.')
        .map(|pos| filename[pos..].to_lowercase())
}

/// True when the file type can be parsed
pub fn is_supported(filename: &str) -> bool {
    file_extension(filename)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Extract plain text from an uploaded document
pub fn parse_document(filename: &str, data: &[u8]) -> Result<String, ApiError> {
    let ext = file_extension(filename)
        .ok_or_else(|| ApiError::UnsupportedDocument(filename.to_string()))?;

    let content = match ext.as_str() {
        ".txt" | ".md" => parse_text(data)?,
        ".pdf" => parse_pdf(data)?,
        ".docx" | ".doc" => parse_docx(data)?,
        other => return Err(ApiError::UnsupportedDocument(other.to_string())),
    };

    if content.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "No content extracted from document".to_string(),
        ));
    }
    Ok(content)
}

fn parse_text(data: &[u8]) -> Result<String, ApiError> {
    Ok(String::from_utf8_lossy(data).into_owned())
}

fn parse_pdf(data: &[u8]) -> Result<String, ApiError> {
    pdf_extract::extract_text_from_mem(data)
        .map_err(|e| ApiError::ValidationError(format!("Error parsing PDF: {}", e)))
}

/// Walk the document body in order so text and tables keep their relative
/// positions
fn parse_docx(data: &[u8]) -> Result<String, ApiError> {
    let docx =
        read_docx(data).map_err(|e| ApiError::ValidationError(format!("Error parsing DOCX: {}", e)))?;

    let mut parts: Vec<String> = Vec::new();
    for child in docx.document.children.iter() {
        match child {
            DocumentChild::Paragraph(para) => {
                let text = paragraph_text(para);
                if !text.trim().is_empty() {
                    parts.push(text);
                }
            }
            DocumentChild::Table(table) => {
                let data = table_text(table);
                if !data.is_empty() {
                    parts.push(format!("\n[TABLE]\n{}\n[/TABLE]", data));
                }
            }
            _ => {}
        }
    }

    Ok(parts.join("\n\n"))
}

fn paragraph_text(para: &Paragraph) -> String {
    para.children
        .iter()
        .filter_map(|pc| {
            if let ParagraphChild::Run(run) = pc {
                Some(
                    run.children
                        .iter()
                        .filter_map(|rc| {
                            if let RunChild::Text(t) = rc {
                                Some(t.text.clone())
                            } else {
                                None
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(""),
                )
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("")
}

/// Rows rendered one per line, cells separated by " | "
fn table_text(table: &Table) -> String {
    let mut rows: Vec<String> = Vec::new();
    for row in table.rows.iter() {
        let TableChild::TableRow(row) = row;
        let mut cells: Vec<String> = Vec::new();
        for cell in row.cells.iter() {
            let TableRowChild::TableCell(cell) = cell;
            let text = cell
                .children
                .iter()
                .filter_map(|content| {
                    if let TableCellContent::Paragraph(p) = content {
                        let text = paragraph_text(p);
                        if text.trim().is_empty() {
                            None
                        } else {
                            Some(text)
                        }
                    } else {
                        None
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            if !text.is_empty() {
                cells.push(text);
            }
        }
        if !cells.is_empty() {
            rows.push(cells.join(" | "));
        }
    }
    rows.join("\n")
}
