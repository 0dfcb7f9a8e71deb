//! Conflict-marker scanning and section rewriting
//!
//! Works on the merged working-file text git leaves behind:
//!
//! ```text
//! <<<<<<< ours
//! ...
//! ||||||| base        (diff3 / zdiff3 only)
//! ...
//! =======
//! ...
//! >>>>>>> theirs
//! ```
//!
//! Only an opening `<<<<<<<` starts a section. Stray `=======` or `>>>>>>>`
//! lines outside a section are ordinary text (setext headings, ASCII art).

use super::types::{ConflictSection, Resolution, SectionChoice};
use crate::error::ParseError;

pub const OURS_MARKER: &str = "<<<<<<<";
pub const BASE_MARKER: &str = "|||||||";
pub const SEPARATOR_MARKER: &str = "=======";
pub const THEIRS_MARKER: &str = ">>>>>>>";

/// A marker is exactly seven characters, then end of line or a space and a label
fn is_marker(line: &str, marker: &str) -> bool {
    let line = line.trim_end_matches(['\n', '\r']);
    match line.strip_prefix(marker) {
        Some(rest) => rest.is_empty() || rest.starts_with(' '),
        None => false,
    }
}

enum Block {
    Outside,
    Ours,
    Base,
    Theirs,
}

/// Scan merged text for conflict sections, in file order.
///
/// Lines keep their terminators, so the blocks concatenate back into file text.
/// A section that is never closed or that opens inside another is an error.
pub fn parse_conflict_sections(text: &str) -> Result<Vec<ConflictSection>, ParseError> {
    let mut sections = Vec::new();
    let mut block = Block::Outside;
    let mut start = 0;
    let mut ours = String::new();
    let mut base: Option<String> = None;
    let mut theirs = String::new();

    for (index, line) in text.split_inclusive('\n').enumerate() {
        let number = index + 1;

        if !matches!(block, Block::Outside) && is_marker(line, OURS_MARKER) {
            return Err(ParseError::new(
                format!("conflict marker at line {} opens inside the section from line {}", number, start),
                line.trim_end(),
            ));
        }

        match block {
            Block::Outside => {
                if is_marker(line, OURS_MARKER) {
                    block = Block::Ours;
                    start = number;
                    ours.clear();
                    base = None;
                    theirs.clear();
                }
            }
            Block::Ours => {
                if is_marker(line, BASE_MARKER) {
                    block = Block::Base;
                    base = Some(String::new());
                } else if is_marker(line, SEPARATOR_MARKER) {
                    block = Block::Theirs;
                } else {
                    ours.push_str(line);
                }
            }
            Block::Base => {
                if is_marker(line, SEPARATOR_MARKER) {
                    block = Block::Theirs;
                } else if let Some(base) = base.as_mut() {
                    base.push_str(line);
                }
            }
            Block::Theirs => {
                if is_marker(line, THEIRS_MARKER) {
                    sections.push(ConflictSection {
                        start_line: start,
                        end_line: number,
                        ours: std::mem::take(&mut ours),
                        base: base.take(),
                        theirs: std::mem::take(&mut theirs),
                        resolution: Resolution::Unresolved,
                    });
                    block = Block::Outside;
                } else {
                    theirs.push_str(line);
                }
            }
        }
    }

    if !matches!(block, Block::Outside) {
        let opening = text.split_inclusive('\n').nth(start - 1).unwrap_or_default();
        return Err(ParseError::new(
            format!("conflict section starting at line {} is never closed", start),
            opening.trim_end(),
        ));
    }

    Ok(sections)
}

/// Number of opening conflict markers in `text`
pub fn conflict_marker_count(text: &str) -> usize {
    text.split_inclusive('\n')
        .filter(|line| is_marker(line, OURS_MARKER))
        .count()
}

pub fn has_conflict_markers(text: &str) -> bool {
    conflict_marker_count(text) > 0
}

/// Replace the lines spanned by `section` with the chosen text.
///
/// Returns the rewritten content and how many lines the replacement occupies.
/// Every other line of `content` is left byte-for-byte untouched.
pub fn apply_resolution(
    content: &str,
    section: &ConflictSection,
    choice: &SectionChoice,
) -> Result<(String, usize), ParseError> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    if section.start_line == 0 || section.end_line < section.start_line || section.end_line > lines.len() {
        return Err(ParseError::new(
            format!(
                "section spans lines {}-{} but the content has {} lines",
                section.start_line,
                section.end_line,
                lines.len()
            ),
            lines.get(section.start_line.saturating_sub(1)).copied().unwrap_or_default(),
        ));
    }

    let opening = lines[section.start_line - 1];
    if !is_marker(opening, OURS_MARKER) {
        return Err(ParseError::new(
            format!("line {} is not a conflict marker", section.start_line),
            opening.trim_end(),
        ));
    }

    let replacement = match choice {
        SectionChoice::Ours => section.ours.clone(),
        SectionChoice::Theirs => section.theirs.clone(),
        SectionChoice::Both => format!("{}{}", section.ours, section.theirs),
        SectionChoice::Manual(text) => {
            let closing = lines[section.end_line - 1];
            if !text.is_empty() && !text.ends_with('\n') && closing.ends_with('\n') {
                format!("{}\n", text)
            } else {
                text.clone()
            }
        }
    };
    let replacement_lines = replacement.split_inclusive('\n').count();

    let mut result = String::with_capacity(content.len());
    for line in &lines[..section.start_line - 1] {
        result.push_str(line);
    }
    result.push_str(&replacement);
    for line in &lines[section.end_line..] {
        result.push_str(line);
    }

    Ok((result, replacement_lines))
}
