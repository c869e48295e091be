//! Marker classification tests using rstest for parameterization.

use group_apply_kernel::{LineKind, Markers};
use rstest::rstest;

// =============================================================================
// Default markers
// =============================================================================

#[rstest]
#[case::begin_bare("= BEGIN =\n", LineKind::Begin)]
#[case::begin_no_newline("= BEGIN =", LineKind::Begin)]
#[case::begin_trailing_text("= BEGIN = section 2\n", LineKind::Begin)]
#[case::end_bare("= END =\n", LineKind::End)]
#[case::end_trailing_text("= END = section 2\n", LineKind::End)]
#[case::end_crlf("= END =\r\n", LineKind::End)]
#[case::plain("hello\n", LineKind::Data)]
#[case::empty("\n", LineKind::Data)]
#[case::leading_space(" = BEGIN =\n", LineKind::Data)]
#[case::lowercase("= begin =\n", LineKind::Data)]
#[case::truncated("= BEGIN\n", LineKind::Data)]
#[case::marker_mid_line("x = END =\n", LineKind::Data)]
fn default_markers(#[case] line: &str, #[case] expected: LineKind) {
    assert_eq!(Markers::default().classify(line.as_bytes()), expected);
}

// =============================================================================
// Custom markers
// =============================================================================

#[rstest]
#[case::open("<<<\n", LineKind::Begin)]
#[case::close(">>>\n", LineKind::End)]
#[case::default_begin_is_data("= BEGIN =\n", LineKind::Data)]
#[case::default_end_is_data("= END =\n", LineKind::Data)]
fn custom_markers(#[case] line: &str, #[case] expected: LineKind) {
    let markers = Markers::new("<<<", ">>>").unwrap();
    assert_eq!(markers.classify(line.as_bytes()), expected);
}

#[test]
fn non_utf8_lines_are_data() {
    assert_eq!(Markers::default().classify(b"\xff\xfe= BEGIN =\n"), LineKind::Data);
}
