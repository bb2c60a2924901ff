//! Telemetry line decoding: parsing the header device firmware prints.
//!
//! Devices on the serial side emit human-readable lines of the form:
//!
//! ```text
//! [00012345|sensors/imu      ] ax=0.013 ay=9.807
//!  ^^^^^^^^ ^^^^^^^^^^^^^^^^   ^^^^^^^^^^^^^^^^^
//!  millis   channel (padded)   message payload
//! ```
//!
//! The header carries the device uptime in milliseconds and a slash-separated
//! channel path.  Firmware pads the channel to a fixed width so the raw log
//! stays column-aligned on a terminal, which is why both header fields are
//! trimmed during decoding.
//!
//! Lines without a recognisable header (boot banners, stack traces, plain
//! `printf` debugging) are still forwarded: they decode to an empty channel
//! with the whole trimmed line as the message, so dashboards can show them in
//! a catch-all console view.
//!
//! # Decoding is total
//!
//! [`decode_line`] never fails.  Malformed input degrades field by field: an
//! unparseable timestamp becomes `NaN`, a missing header becomes an empty
//! channel.  Dropping lines is not an option here because the least
//! well-formed output tends to arrive exactly when the firmware is crashing.

/// A device output line decoded into its header fields.
///
/// Produced by [`decode_line`] for every line read from a serial port,
/// whether or not the line carries a header.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    /// Device uptime in milliseconds, parsed from the header.
    ///
    /// `NaN` when the line has no header or the timestamp text is not a
    /// number.  Consumers that forward this as JSON map `NaN` to `null`.
    pub timestamp: f64,

    /// Slash-separated channel path from the header (e.g. `sensors/imu`),
    /// with the firmware's alignment padding removed.
    ///
    /// Empty when the line has no header.
    pub channel: String,

    /// The payload after the closing bracket, surrounding whitespace removed.
    ///
    /// For headerless lines this is the whole trimmed line.
    pub message: String,

    /// The line exactly as received, before any trimming.
    pub raw: String,
}

impl DecodedMessage {
    /// Fallback for lines without a complete `[...]` header.
    fn headerless(input: &str, trimmed: &str) -> Self {
        Self {
            timestamp: f64::NAN,
            channel: String::new(),
            message: trimmed.to_string(),
            raw: input.to_string(),
        }
    }
}

/// Decodes one device output line into a [`DecodedMessage`].
///
/// The header is recognised by the first `[` and the first `]` after it.  A
/// `|` between them separates timestamp from channel; without one, the whole
/// bracketed text is taken as the channel and the timestamp is absent.
/// Anything that does not fit this shape falls back to a headerless decode
/// (`NaN` timestamp, empty channel, whole trimmed line as the message).
///
/// All delimiters are ASCII, so the byte offsets from `find` are always valid
/// slice boundaries even when the surrounding text is multi-byte UTF-8.
pub fn decode_line(input: &str) -> DecodedMessage {
    let trimmed = input.trim();

    let Some(open) = trimmed.find('[') else {
        return DecodedMessage::headerless(input, trimmed);
    };
    let Some(close) = trimmed[open..].find(']').map(|i| open + i) else {
        return DecodedMessage::headerless(input, trimmed);
    };

    // Only a `|` inside the brackets counts as the header separator; one in
    // the message payload is ordinary text.
    let separator = trimmed[open..close].find('|').map(|i| open + i);

    let (timestamp_text, channel) = match separator {
        Some(sep) => (&trimmed[open + 1..sep], &trimmed[sep + 1..close]),
        None => ("", &trimmed[open + 1..close]),
    };

    DecodedMessage {
        timestamp: timestamp_text.trim().parse().unwrap_or(f64::NAN),
        channel: channel.trim().to_string(),
        message: trimmed[close + 1..].trim().to_string(),
        raw: input.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_header() {
        // Arrange / Act
        let decoded = decode_line("[100|A] hello");

        // Assert
        assert_eq!(decoded.timestamp, 100.0);
        assert_eq!(decoded.channel, "A");
        assert_eq!(decoded.message, "hello");
        assert_eq!(decoded.raw, "[100|A] hello");
    }

    #[test]
    fn test_decode_zero_padded_timestamp() {
        // Firmware prints the uptime zero-padded to eight digits.
        let decoded = decode_line("[00012345|sensors/imu      ] ax=0.013 ay=9.807");
        assert_eq!(decoded.timestamp, 12345.0);
    }

    #[test]
    fn test_decode_padded_channel_is_trimmed() {
        // The channel is left-justified to a fixed width on the wire.
        let decoded = decode_line("[00012345|sensors/imu      ] ax=0.013");
        assert_eq!(decoded.channel, "sensors/imu");
    }

    #[test]
    fn test_decode_headerless_line() {
        // Arrange / Act
        let decoded = decode_line("no brackets here");

        // Assert: the whole line becomes the message
        assert!(decoded.timestamp.is_nan());
        assert_eq!(decoded.channel, "");
        assert_eq!(decoded.message, "no brackets here");
    }

    #[test]
    fn test_decode_unparseable_timestamp_yields_nan() {
        let decoded = decode_line("[abc|X] data");
        assert!(decoded.timestamp.is_nan());
        assert_eq!(decoded.channel, "X");
        assert_eq!(decoded.message, "data");
    }

    #[test]
    fn test_decode_missing_separator_treats_bracket_text_as_channel() {
        // Without a `|`, there is no timestamp field to parse.
        let decoded = decode_line("[status] no separator");
        assert!(decoded.timestamp.is_nan());
        assert_eq!(decoded.channel, "status");
        assert_eq!(decoded.message, "no separator");
    }

    #[test]
    fn test_decode_separator_after_close_does_not_count() {
        // The `|` in the payload must not be mistaken for the header separator.
        let decoded = decode_line("[boot] ready | waiting");
        assert!(decoded.timestamp.is_nan());
        assert_eq!(decoded.channel, "boot");
        assert_eq!(decoded.message, "ready | waiting");
    }

    #[test]
    fn test_decode_no_closing_bracket_is_headerless() {
        let decoded = decode_line("[100|A hello");
        assert!(decoded.timestamp.is_nan());
        assert_eq!(decoded.channel, "");
        assert_eq!(decoded.message, "[100|A hello");
    }

    #[test]
    fn test_decode_close_before_open_is_headerless() {
        // A `]` left of the first `[` does not form a header.
        let decoded = decode_line("]|[ reversed");
        assert!(decoded.timestamp.is_nan());
        assert_eq!(decoded.channel, "");
        assert_eq!(decoded.message, "]|[ reversed");
    }

    #[test]
    fn test_decode_empty_input() {
        let decoded = decode_line("");
        assert!(decoded.timestamp.is_nan());
        assert_eq!(decoded.channel, "");
        assert_eq!(decoded.message, "");
        assert_eq!(decoded.raw, "");
    }

    #[test]
    fn test_decode_whitespace_only_input() {
        let decoded = decode_line("   \t  ");
        assert!(decoded.timestamp.is_nan());
        assert_eq!(decoded.message, "");
        assert_eq!(decoded.raw, "   \t  ");
    }

    #[test]
    fn test_decode_surrounding_whitespace_is_trimmed() {
        let decoded = decode_line("  [200|B]  spaced  ");
        assert_eq!(decoded.timestamp, 200.0);
        assert_eq!(decoded.channel, "B");
        assert_eq!(decoded.message, "spaced");
    }

    #[test]
    fn test_decode_preserves_raw_untrimmed() {
        // Dashboards showing the raw console view need the line as received.
        let decoded = decode_line("  [200|B]  spaced  ");
        assert_eq!(decoded.raw, "  [200|B]  spaced  ");
    }

    #[test]
    fn test_decode_crlf_residue_is_trimmed_from_message() {
        // A CRLF device read with an LF terminator leaves a trailing `\r`.
        let decoded = decode_line("[100|A] hello\r");
        assert_eq!(decoded.message, "hello");
        assert_eq!(decoded.raw, "[100|A] hello\r");
    }

    #[test]
    fn test_decode_message_may_contain_brackets() {
        // Only the first `]` closes the header.
        let decoded = decode_line("[100|A] array[3] = 7");
        assert_eq!(decoded.timestamp, 100.0);
        assert_eq!(decoded.message, "array[3] = 7");
    }

    #[test]
    fn test_decode_header_with_empty_fields() {
        let decoded = decode_line("[|] empty");
        assert!(decoded.timestamp.is_nan());
        assert_eq!(decoded.channel, "");
        assert_eq!(decoded.message, "empty");
    }

    #[test]
    fn test_decode_header_only_no_message() {
        let decoded = decode_line("[100|A]");
        assert_eq!(decoded.timestamp, 100.0);
        assert_eq!(decoded.channel, "A");
        assert_eq!(decoded.message, "");
    }

    #[test]
    fn test_decode_text_before_header_is_dropped() {
        // Garbage before the first `[` (e.g. a partial first read) is not
        // part of any field, but survives in `raw`.
        let decoded = decode_line("x7\u{fffd}[500|motors/left] pwm=128");
        assert_eq!(decoded.timestamp, 500.0);
        assert_eq!(decoded.channel, "motors/left");
        assert_eq!(decoded.message, "pwm=128");
        assert!(decoded.raw.starts_with("x7"));
    }

    #[test]
    fn test_decode_negative_timestamp() {
        let decoded = decode_line("[-5|clock] skew test");
        assert_eq!(decoded.timestamp, -5.0);
    }

    #[test]
    fn test_decode_fractional_timestamp() {
        let decoded = decode_line("[3.25|hires] tick");
        assert_eq!(decoded.timestamp, 3.25);
    }

    #[test]
    fn test_decode_whitespace_inside_header_is_trimmed() {
        let decoded = decode_line("[ 100 | A ] hello");
        assert_eq!(decoded.timestamp, 100.0);
        assert_eq!(decoded.channel, "A");
    }

    #[test]
    fn test_decode_unicode_channel_and_message() {
        // Delimiters are ASCII; the rest of the line can be any UTF-8.
        let decoded = decode_line("[42|sensors/Δtemp] värde=21.5°C");
        assert_eq!(decoded.timestamp, 42.0);
        assert_eq!(decoded.channel, "sensors/Δtemp");
        assert_eq!(decoded.message, "värde=21.5°C");
    }
}
