//! Byte-budgeted shape inference for inputs too large to decode whole.
//!
//! Only the first `max_bytes` of the input are read. When the input is
//! longer, the prefix is cut at the last array-element boundary and the
//! brackets still open at that point are closed, which always yields a
//! parseable document as long as the input itself was valid JSON.
//!
//! The scanner tracks string state (including backslash escapes) so that
//! bracket and comma characters inside string literals, such as a field
//! named `"b ] "` or `"b \" "`, are never taken as structure.

use std::io::Read;
use std::path::Path;

use serde_json::Value;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::error::{Error, Result};

use super::infer::{Shape, infer};

/// A position at which the buffer can be cut, and the bytes that close it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeCut {
    /// Length of the prefix to keep.
    pub offset: usize,
    /// Closing brackets to append, innermost first.
    pub closers: Vec<u8>,
}

impl SafeCut {
    fn closing(offset: usize, open: &[u8]) -> Self {
        let closers = open
            .iter()
            .rev()
            .map(|&b| if b == b'[' { b']' } else { b'}' })
            .collect();
        Self { offset, closers }
    }
}

/// Open-bracket stack as it stood at the last safe point.
///
/// Only the part of the stack that changed since the previous safe point
/// is copied, so marking is linear over the whole scan.
#[derive(Default)]
struct OpenSnapshot {
    stack: Vec<u8>,
    /// Lowest stack depth reached since the last mark.
    low: usize,
}

impl OpenSnapshot {
    fn popped_to(&mut self, depth: usize) {
        self.low = self.low.min(depth);
    }

    fn mark(&mut self, open: &[u8]) {
        self.stack.truncate(self.low);
        self.stack.extend_from_slice(&open[self.low..]);
        self.low = open.len();
    }
}

/// Find the last point in `buf` where the prefix ends on a complete array
/// element, or on a complete top-level document.
///
/// Returns `None` when no element was completed inside the buffer.
pub fn find_safe_cut(buf: &[u8]) -> Option<SafeCut> {
    let mut open: Vec<u8> = Vec::new();
    let mut snapshot = OpenSnapshot::default();
    let mut in_string = false;
    let mut escaped = false;
    let mut last = None;

    for (i, &byte) in buf.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => open.push(byte),
            b']' | b'}' => {
                open.pop();
                snapshot.popped_to(open.len());
                if matches!(open.last(), None | Some(b'[')) {
                    snapshot.mark(&open);
                    last = Some(i + 1);
                }
            }
            // Everything before a comma in an array is a complete element.
            b',' if open.last() == Some(&b'[') => {
                snapshot.mark(&open);
                last = Some(i);
            }
            _ => {}
        }
    }

    last.map(|offset| SafeCut::closing(offset, &snapshot.stack))
}

/// Infer a shape from a sample holding up to `max_bytes + 1` leading bytes
/// of the input. A sample longer than `max_bytes` means the input did not
/// fit and must be truncated.
pub fn shape_from_sample(
    mut sample: Vec<u8>,
    label: &str,
    max_bytes: usize,
    max_depth: usize,
) -> Result<Shape> {
    if sample.len() > max_bytes {
        sample.truncate(max_bytes);
        let cut = find_safe_cut(&sample).ok_or(Error::TruncationBoundaryNotFound { max_bytes })?;
        debug!(
            "Sampling {}: truncated at byte {} of {}, closing {} bracket(s)",
            label,
            cut.offset,
            max_bytes,
            cut.closers.len()
        );
        sample.truncate(cut.offset);
        sample.extend_from_slice(&cut.closers);
    }

    let value: Value = serde_json::from_slice(&sample)?;
    Ok(infer(label, &value, max_depth))
}

/// Infer the shape of a JSON file, reading at most `max_bytes` of it.
///
/// Fails with [`Error::TruncationBoundaryNotFound`] when the file is larger
/// than the budget and the budget does not hold a single complete element.
pub async fn shape_from_file(
    path: impl AsRef<Path>,
    label: &str,
    max_bytes: usize,
    max_depth: usize,
) -> Result<Shape> {
    let file = tokio::fs::File::open(path.as_ref()).await?;
    let mut sample = Vec::new();
    file.take((max_bytes as u64).saturating_add(1))
        .read_to_end(&mut sample)
        .await?;
    shape_from_sample(sample, label, max_bytes, max_depth)
}

/// Blocking counterpart of [`shape_from_file`] for any byte stream.
pub fn shape_from_reader<R: Read>(
    reader: R,
    label: &str,
    max_bytes: usize,
    max_depth: usize,
) -> Result<Shape> {
    let mut sample = Vec::new();
    reader
        .take((max_bytes as u64).saturating_add(1))
        .read_to_end(&mut sample)?;
    shape_from_sample(sample, label, max_bytes, max_depth)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::shape::infer::ScalarName;

    fn number() -> Shape {
        Shape::scalar(ScalarName::Number)
    }

    fn string() -> Shape {
        Shape::scalar(ScalarName::String)
    }

    fn write_temp(json: &str) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(json.as_bytes()).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    mod scanner {
        use super::*;

        #[test]
        fn test_cut_before_last_array_comma() {
            let cut = find_safe_cut(b"[1, 2, 3").unwrap();
            assert_eq!(cut.offset, 5);
            assert_eq!(cut.closers, b"]");
        }

        #[test]
        fn test_cut_after_closed_element() {
            let cut = find_safe_cut(br#"[{"a": 1}"#).unwrap();
            assert_eq!(cut.offset, 9);
            assert_eq!(cut.closers, b"]");
        }

        #[test]
        fn test_nested_array_inside_object_closes_both() {
            let buf = br#"{"rows": [{"a": 1}, {"a": 2"#;
            let cut = find_safe_cut(buf).unwrap();
            assert_eq!(&buf[..cut.offset], br#"{"rows": [{"a": 1}"#);
            assert_eq!(cut.closers, b"]}");
        }

        #[test]
        fn test_brackets_inside_strings_ignored() {
            let buf = br#"[{"b ], ": 1"#;
            assert_eq!(find_safe_cut(buf), None);
        }

        #[test]
        fn test_escaped_quote_keeps_string_open() {
            let buf = br#"[{"b \" ], ": 1"#;
            assert_eq!(find_safe_cut(buf), None);
        }

        #[test]
        fn test_escaped_backslash_closes_string() {
            let buf = br#"["a\\", "b"#;
            let cut = find_safe_cut(buf).unwrap();
            assert_eq!(&buf[..cut.offset], br#"["a\\""#);
        }

        #[test]
        fn test_complete_document_needs_no_closers() {
            let cut = find_safe_cut(br#"[{"a": 1}]"#).unwrap();
            assert_eq!(cut.offset, 10);
            assert!(cut.closers.is_empty());
        }

        #[test]
        fn test_object_member_commas_are_not_cuts() {
            assert_eq!(find_safe_cut(br#"[{"a": 1, "b": 2"#), None);
        }

        #[test]
        fn test_closers_come_from_last_safe_point() {
            // The array closes and a sibling object opens after the last cut
            let buf = br#"{"a": [1, 2], "b": {"c": 3"#;
            let cut = find_safe_cut(buf).unwrap();
            assert_eq!(&buf[..cut.offset], br#"{"a": [1"#);
            assert_eq!(cut.closers, b"]}");
        }

        #[test]
        fn test_closers_after_deeper_nesting() {
            let buf = br#"[[1, [2, 3]], [4, [5"#;
            let cut = find_safe_cut(buf).unwrap();
            assert_eq!(&buf[..cut.offset], br#"[[1, [2, 3]], [4"#);
            assert_eq!(cut.closers, b"]]");
        }

        #[test]
        fn test_empty_buffer() {
            assert_eq!(find_safe_cut(b""), None);
        }
    }

    mod from_file {
        use super::*;

        async fn shape_with_budget(json: &str, max_bytes: usize) -> Result<Shape> {
            let tmp = write_temp(json);
            shape_from_file(tmp.path(), "x", max_bytes, 50).await
        }

        #[tokio::test]
        async fn test_bracket_in_field_name_fits() {
            let shape = shape_with_budget(r#"[{"a": 1, "b ] ": 2}, {"a": 2, "b ] ": 3}]"#, 200)
                .await
                .unwrap();
            assert_eq!(
                shape,
                Shape::array(Shape::object([("a", number()), ("b ] ", number())]))
            );
        }

        #[tokio::test]
        async fn test_escaped_quote_in_field_name_fits() {
            let shape = shape_with_budget(r#"[{"a": 1, "b \" ": 2}, {"a": 2, "b \" ": 3}]"#, 200)
                .await
                .unwrap();
            assert_eq!(
                shape,
                Shape::array(Shape::object([("a", number()), ("b \" ", number())]))
            );
        }

        #[tokio::test]
        async fn test_full_file_matches_in_memory_inference() {
            let json = r#"[{"a": 1, "b": "y"}, {"a": 2, "b": "x"}]"#;
            let value: Value = serde_json::from_str(json).unwrap();
            let shape = shape_with_budget(json, 200).await.unwrap();
            assert_eq!(shape, infer("x", &value, 50));
            assert_eq!(
                shape,
                Shape::array(Shape::object([("a", number()), ("b", string())]))
            );
        }

        #[tokio::test]
        async fn test_budget_equal_to_file_length_fits() {
            let json = r#"[{"a": 1}]"#;
            let shape = shape_with_budget(json, json.len()).await.unwrap();
            assert_eq!(shape, Shape::array(Shape::object([("a", number())])));
        }

        #[tokio::test]
        async fn test_truncated_file_reflects_prefix_only() {
            let json = r#"[{"a": 1, "b ] ": 2}, {"c": 2, "d": "x"}]"#;
            let budget = json.find(r#""c""#).unwrap() + 2;
            let shape = shape_with_budget(json, budget).await.unwrap();
            assert_eq!(
                shape,
                Shape::array(Shape::object([("a", number()), ("b ] ", number())]))
            );
        }

        #[tokio::test]
        async fn test_truncated_with_escaped_quote_in_field_name() {
            let json = r#"[{"a": 1, "b \" ": 2}, {"c": 2, "d \" ]": "x"}]"#;
            let budget = json.find(r#"]": "x""#).unwrap() + 1;
            let shape = shape_with_budget(json, budget).await.unwrap();
            assert_eq!(
                shape,
                Shape::array(Shape::object([("a", number()), ("b \" ", number())]))
            );
        }

        #[tokio::test]
        async fn test_trailing_newline_beyond_budget() {
            let json = "[{\"a\": 1}]\n";
            let shape = shape_with_budget(json, json.len() - 1).await.unwrap();
            assert_eq!(shape, Shape::array(Shape::object([("a", number())])));
        }

        #[tokio::test]
        async fn test_budget_smaller_than_first_element_fails() {
            let err = shape_with_budget(r#"[{"a": 1, "b": "y"}, {"c": 2, "d": "x"}]"#, 8)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                Error::TruncationBoundaryNotFound { max_bytes: 8 }
            ));
        }

        #[tokio::test]
        async fn test_malformed_json_is_json_error() {
            let err = shape_with_budget(r#"[{"a": 1,}]"#, 200).await.unwrap_err();
            assert!(matches!(err, Error::Json(_)));
        }

        #[tokio::test]
        async fn test_unbounded_budget_reads_whole_file() {
            let json = r#"[{"a": 1}, {"a": 2}]"#;
            let shape = shape_with_budget(json, usize::MAX).await.unwrap();
            assert_eq!(shape, Shape::array(Shape::object([("a", number())])));
        }

        #[test]
        fn test_unbounded_budget_reads_whole_stream() {
            let json = br#"{"a": [true]}"#;
            let shape = shape_from_reader(&json[..], "x", usize::MAX, 50).unwrap();
            assert_eq!(
                shape,
                Shape::object([("a", Shape::array(Shape::scalar(ScalarName::Boolean)))])
            );
        }

        #[tokio::test]
        async fn test_missing_file_is_io_error() {
            let err = shape_from_file("/definitely/not/here.json", "x", 10, 50)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Io(_)));
        }
    }

    mod from_reader {
        use super::*;

        #[test]
        fn test_reader_applies_budget() {
            let json = br#"[{"a": 1}, {"b": 2}, {"c": 3}]"#;
            let shape = shape_from_reader(&json[..], "x", 14, 50).unwrap();
            assert_eq!(shape, Shape::array(Shape::object([("a", number())])));
        }

        #[test]
        fn test_reader_scalar_root_within_budget() {
            let shape = shape_from_reader(&b"\"hello\""[..], "x", 100, 50).unwrap();
            assert_eq!(shape, string());
        }
    }
}
