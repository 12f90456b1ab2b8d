//! Eligibility rules for relaying a message.

use crate::domain::MessageDescriptor;

/// Why a message was not relayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Fetch returned nothing for this position.
    Missing,
    /// Service/system message (joins, pins, title changes).
    Service,
    NoMedia,
    /// Link preview or media the transport marks unsupported.
    Preview,
    /// Source marked the message non-forwardable.
    Restricted,
    /// Media present but not a photo, document or video.
    UnsupportedKind,
}

impl SkipReason {
    /// Gap outcomes feed the consecutive-gap circuit breaker.
    pub fn is_gap(self) -> bool {
        matches!(self, SkipReason::Missing | SkipReason::Service)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Missing => "missing",
            SkipReason::Service => "service",
            SkipReason::NoMedia => "no_media",
            SkipReason::Preview => "preview",
            SkipReason::Restricted => "restricted",
            SkipReason::UnsupportedKind => "unsupported_kind",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Relay,
    Skip(SkipReason),
}

/// Strict relay gate. Checks run in priority order; the first failing rule wins.
pub fn classify(msg: Option<&MessageDescriptor>) -> Verdict {
    let Some(msg) = msg else {
        return Verdict::Skip(SkipReason::Missing);
    };
    if msg.is_service {
        return Verdict::Skip(SkipReason::Service);
    }
    let Some(media) = msg.media.as_ref() else {
        return Verdict::Skip(SkipReason::NoMedia);
    };
    if media.kind.is_preview_or_unsupported() {
        return Verdict::Skip(SkipReason::Preview);
    }
    if msg.no_forwards {
        return Verdict::Skip(SkipReason::Restricted);
    }
    if !media.kind.is_relayable() {
        return Verdict::Skip(SkipReason::UnsupportedKind);
    }
    Verdict::Relay
}

/// Loose test used only for the progress denominator: any real, forwardable
/// media counts, whatever its kind.
pub fn counts_as_media(msg: &MessageDescriptor) -> bool {
    if msg.is_service || msg.no_forwards {
        return false;
    }
    msg.media
        .as_ref()
        .map(|m| !m.kind.is_preview_or_unsupported())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Media, MediaKind, Position};

    fn desc(kind: Option<MediaKind>) -> MessageDescriptor {
        MessageDescriptor {
            position: Position(7),
            media: kind.map(|kind| Media {
                kind,
                file_ref: "ref".to_string(),
            }),
            no_forwards: false,
            is_service: false,
        }
    }

    #[test]
    fn never_relays_absent_service_or_text_only() {
        assert_eq!(classify(None), Verdict::Skip(SkipReason::Missing));

        let mut service = desc(Some(MediaKind::Photo));
        service.is_service = true;
        assert_eq!(classify(Some(&service)), Verdict::Skip(SkipReason::Service));

        assert_eq!(classify(Some(&desc(None))), Verdict::Skip(SkipReason::NoMedia));
    }

    #[test]
    fn relays_forwardable_photo_document_video() {
        for kind in [MediaKind::Photo, MediaKind::Document, MediaKind::Video] {
            assert_eq!(classify(Some(&desc(Some(kind)))), Verdict::Relay);
        }
    }

    #[test]
    fn preview_outranks_restriction() {
        let mut m = desc(Some(MediaKind::WebPage));
        m.no_forwards = true;
        assert_eq!(classify(Some(&m)), Verdict::Skip(SkipReason::Preview));

        let mut m = desc(Some(MediaKind::Video));
        m.no_forwards = true;
        assert_eq!(classify(Some(&m)), Verdict::Skip(SkipReason::Restricted));
    }

    #[test]
    fn other_kinds_count_but_do_not_relay() {
        let poll = desc(Some(MediaKind::Other("poll".to_string())));
        assert_eq!(
            classify(Some(&poll)),
            Verdict::Skip(SkipReason::UnsupportedKind)
        );
        assert!(counts_as_media(&poll));

        assert!(!counts_as_media(&desc(Some(MediaKind::Unsupported))));
        assert!(!counts_as_media(&desc(None)));
    }

    #[test]
    fn only_missing_and_service_are_gaps() {
        assert!(SkipReason::Missing.is_gap());
        assert!(SkipReason::Service.is_gap());
        assert!(!SkipReason::NoMedia.is_gap());
        assert!(!SkipReason::Restricted.is_gap());
    }
}
