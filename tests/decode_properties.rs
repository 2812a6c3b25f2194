//! Block-split independence of the inbound decoder.

use proptest::prelude::*;
use serial_link::DecodeTransform;

/// Decode `bytes` delivered as blocks cut at `cuts`, through one transform.
fn decode_in_blocks(bytes: &[u8], cuts: &[usize]) -> String {
    let mut transform = DecodeTransform::new();
    let mut text = String::new();
    let mut start = 0;
    for &cut in cuts.iter().chain(std::iter::once(&bytes.len())) {
        let cut = cut.clamp(start, bytes.len());
        text.push_str(transform.transform(&bytes[start..cut]).text());
        start = cut;
    }
    if let Some(tail) = transform.flush() {
        text.push_str(tail.text());
    }
    text
}

fn sorted(mut cuts: Vec<usize>) -> Vec<usize> {
    cuts.sort_unstable();
    cuts
}

proptest! {
    #[test]
    fn any_split_of_valid_text_decodes_to_the_text(
        text in "\\PC{0,64}",
        cuts in prop::collection::vec(0usize..256, 0..8),
    ) {
        let bytes = text.as_bytes();
        prop_assert_eq!(decode_in_blocks(bytes, &sorted(cuts)), text);
    }

    #[test]
    fn any_split_of_arbitrary_bytes_matches_whole_decode(
        bytes in prop::collection::vec(any::<u8>(), 0..128),
        cuts in prop::collection::vec(0usize..128, 0..8),
    ) {
        let whole = decode_in_blocks(&bytes, &[]);
        prop_assert_eq!(decode_in_blocks(&bytes, &sorted(cuts)), whole);
    }

    #[test]
    fn raw_bytes_are_reported_unchanged(
        bytes in prop::collection::vec(any::<u8>(), 1..64),
    ) {
        let mut transform = DecodeTransform::new();
        let chunk = transform.transform(&bytes);
        prop_assert_eq!(chunk.raw, Some(bytes));
    }
}
