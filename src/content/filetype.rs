//! Payload type sniffing
//!
//! Tiles are often renamed or stored without an extension, so the type is
//! taken from the header bytes via `infer` rather than from the file name.

/// What a payload's header bytes say about it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sniffed {
    /// MIME type, if the header matched a known format
    pub mime_type: Option<String>,

    /// Whether the format is an image
    pub image: bool,
}

/// Sniff the type of `payload`
///
/// ```
/// use dc_import::content::filetype::sniff;
///
/// let sniffed = sniff(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
/// assert_eq!(sniffed.mime_type.as_deref(), Some("image/png"));
/// assert!(sniffed.image);
/// ```
pub fn sniff(payload: &[u8]) -> Sniffed {
    match infer::get(payload) {
        Some(kind) => Sniffed {
            mime_type: Some(kind.mime_type().to_string()),
            image: kind.matcher_type() == infer::MatcherType::Image,
        },
        None => Sniffed::default(),
    }
}
