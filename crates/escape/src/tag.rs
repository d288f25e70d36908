//! Escape words and their serialized parameter tags.
//!
//! An escape word packs, least significant bits first, the escape class
//! (3 bits), the content-escapes flag (1 bit) and one 3-bit field per
//! output parameter holding `level + 1` of the flow from the parameter to
//! that output (0 meaning no flow).
use std::fmt;

use crate::level::Level;

pub const ESC_BITS: u16 = 3;
pub const ESC_MASK: u16 = (1 << ESC_BITS) - 1;
/// The parameter content, reached through at least one dereference,
/// escapes to the heap.
pub const ESC_CONTENT_ESCAPES: u16 = 1 << ESC_BITS;
pub const ESC_RETURN_BITS: u16 = ESC_BITS + 1;

pub const BITS_PER_OUTPUT_IN_TAG: u16 = 3;
pub const BITS_MASK_FOR_TAG: u16 = (1 << BITS_PER_OUTPUT_IN_TAG) - 1;
pub const OUTPUTS_PER_TAG: u16 = (16 - ESC_RETURN_BITS) / BITS_PER_OUTPUT_IN_TAG;
pub const MAX_ENCODED_LEVEL: i32 = BITS_MASK_FOR_TAG as i32 - 1;

const TAG_PREFIX: &str = "esc:";

/// Escape class stored in the low bits of an escape word.
///
/// The order of the variants is the order of the escape lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u16)]
pub enum EscClass {
    /// Not analyzed yet, or no information.
    #[default]
    Unknown = 0,
    /// Does not escape to the heap, the result or any parameter.
    None = 1,
    /// Reachable from a result, see the per-output fields.
    Return = 2,
    /// Reachable from something that outlives its scope.
    Scope = 3,
    /// Escapes to the heap.
    Heap = 4,
    /// Never allowed to escape.
    Never = 5,
}

impl EscClass {
    pub fn of(esc: u16) -> Self {
        match esc & ESC_MASK {
            0 => Self::Unknown,
            1 => Self::None,
            2 => Self::Return,
            3 => Self::Scope,
            4 => Self::Heap,
            _ => Self::Never,
        }
    }

    pub const fn bits(self) -> u16 {
        self as u16
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "EscUnknown",
            Self::None => "EscNone",
            Self::Return => "EscReturn",
            Self::Scope => "EscScope",
            Self::Heap => "EscHeap",
            Self::Never => "EscNever",
        }
    }
}

impl fmt::Display for EscClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Raises the class of `e` to at least `etype`.
///
/// Output flow bits and the content-escapes flag survive only while the
/// class stays `None` or `Return`.
pub fn esc_max(e: u16, etype: EscClass) -> u16 {
    if e & ESC_MASK > etype.bits() {
        return e;
    }

    if matches!(etype, EscClass::None | EscClass::Return) {
        return (e & !ESC_MASK) | etype.bits();
    }
    etype.bits()
}

/// Records a flow at `level` from a parameter with escape word `e` to the
/// `vargen`th output of the same function.
///
/// Flow that cannot be encoded makes the parameter escape to the heap.
pub fn note_output_param_flow(e: u16, vargen: u32, level: Level) -> u16 {
    if level.value() <= 0 && level.guaranteed_dereference() > 0 {
        // Only content flows, through at least one dereference.
        return esc_max(e | ESC_CONTENT_ESCAPES, EscClass::None);
    }
    if level.value() < 0 {
        return EscClass::Heap.bits();
    }

    let encoded = level.value().min(MAX_ENCODED_LEVEL) as u16 + 1;

    let Some(shift) = output_shift(vargen) else {
        return EscClass::Heap.bits();
    };

    let mut old = (e >> shift) & BITS_MASK_FOR_TAG;
    if old == 0 || encoded < old {
        old = encoded;
    }

    (e & !(BITS_MASK_FOR_TAG << shift)) | (old << shift)
}

/// The bit offset of the field of the `vargen`th output, if it fits.
fn output_shift(vargen: u32) -> Option<u16> {
    if vargen == 0 || vargen > OUTPUTS_PER_TAG as u32 {
        return None;
    }
    Some(BITS_PER_OUTPUT_IN_TAG * (vargen as u16 - 1) + ESC_RETURN_BITS)
}

/// Serializes an escape word into a parameter tag.
///
/// Only `None` and `Return` words are worth a tag: any other class means the
/// caller must assume the parameter escapes.
pub fn mktag(esc: u16) -> Option<String> {
    match EscClass::of(esc) {
        EscClass::None | EscClass::Return => Some(format!("{TAG_PREFIX}0x{esc:x}")),
        _ => None,
    }
}

/// Decodes a parameter tag. A missing or malformed tag decodes to
/// `Unknown`, and a zero word to `None`.
pub fn parsetag(note: Option<&str>) -> u16 {
    let Some(bits) = note.and_then(|note| note.strip_prefix(TAG_PREFIX)) else {
        return EscClass::Unknown.bits();
    };

    let parsed = match bits.strip_prefix("0x") {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => bits.parse::<u16>(),
    };
    match parsed {
        Ok(0) => EscClass::None.bits(),
        Ok(esc) => esc,
        Err(_) => EscClass::Unknown.bits(),
    }
}

/// Iterates over the per-output fields of `esc`, stopping after the last
/// non-zero one.
pub fn output_fields(esc: u16) -> impl Iterator<Item = u16> {
    let mut rest = esc >> ESC_RETURN_BITS;
    std::iter::from_fn(move || {
        if rest == 0 {
            return None;
        }
        let field = rest & BITS_MASK_FOR_TAG;
        rest >>= BITS_PER_OUTPUT_IN_TAG;
        Some(field)
    })
}

/// Renders an escape word for humans, e.g. `EscReturn contentToHeap _ =`.
///
/// Each output field prints `_` for no flow, `=` for direct flow and one
/// `*` per dereference otherwise.
pub fn describe_escape(esc: u16) -> String {
    let mut parts: Vec<String> = Vec::new();
    match EscClass::of(esc) {
        EscClass::Never => {}
        class => parts.push(class.as_str().to_string()),
    }
    if esc & ESC_CONTENT_ESCAPES != 0 {
        parts.push("contentToHeap".to_string());
    }

    for field in output_fields(esc) {
        parts.push(match field {
            0 => "_".to_string(),
            1 => "=".to_string(),
            n => "*".repeat(n as usize - 1),
        });
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        assert_eq!(ESC_MASK, 7);
        assert_eq!(ESC_CONTENT_ESCAPES, 8);
        assert_eq!(ESC_RETURN_BITS, 4);
        assert_eq!(OUTPUTS_PER_TAG, 4);
        assert_eq!(MAX_ENCODED_LEVEL, 6);
    }

    #[test]
    fn esc_max_is_monotone() {
        let none = EscClass::None.bits();
        assert_eq!(esc_max(0, EscClass::None), none);
        assert_eq!(esc_max(none, EscClass::Heap), EscClass::Heap.bits());
        assert_eq!(
            esc_max(EscClass::Heap.bits(), EscClass::None),
            EscClass::Heap.bits()
        );

        // Flow bits are kept while the class stays low.
        let ret = 0x12;
        assert_eq!(esc_max(ret | ESC_CONTENT_ESCAPES, EscClass::None), 0x1a);
        assert_eq!(esc_max(ret, EscClass::Return), ret);
        assert_eq!(esc_max(ret, EscClass::Scope), EscClass::Scope.bits());

        for e in [0, 1, 2, 3, 4, 0x12, 0x1a] {
            let once = esc_max(e, EscClass::Return);
            assert_eq!(esc_max(once, EscClass::Return), once);
        }
    }

    #[test]
    fn output_flow() {
        let ret = EscClass::Return.bits();
        assert_eq!(note_output_param_flow(ret, 1, Level::ZERO), 0x12);
        assert_eq!(note_output_param_flow(ret, 1, Level::new(1, 0)), 0x22);
        assert_eq!(note_output_param_flow(ret, 2, Level::ZERO), 0x82);

        // The smallest level wins.
        let e = note_output_param_flow(ret, 1, Level::new(2, 0));
        assert_eq!(e, 0x32);
        assert_eq!(note_output_param_flow(e, 1, Level::ZERO), 0x12);
        assert_eq!(note_output_param_flow(0x12, 1, Level::new(2, 0)), 0x12);

        // Deep levels are clamped.
        assert_eq!(note_output_param_flow(ret, 1, Level::from_int(40)), 0x72);
    }

    #[test]
    fn output_flow_degrades() {
        let ret = EscClass::Return.bits();
        assert_eq!(
            note_output_param_flow(ret, 5, Level::ZERO),
            EscClass::Heap.bits()
        );
        assert_eq!(
            note_output_param_flow(ret, 0, Level::ZERO),
            EscClass::Heap.bits()
        );
        assert_eq!(
            note_output_param_flow(ret, 1, Level::new(-1, 0)),
            EscClass::Heap.bits()
        );
        assert_eq!(
            note_output_param_flow(ret, 1, Level::new(0, 1)),
            EscClass::Return.bits() | ESC_CONTENT_ESCAPES
        );
        assert_eq!(note_output_param_flow(ret, 4, Level::ZERO), 0x2002);
    }

    #[test]
    fn tags() {
        assert_eq!(mktag(0x12).as_deref(), Some("esc:0x12"));
        assert_eq!(mktag(1).as_deref(), Some("esc:0x1"));
        assert_eq!(mktag(0x9).as_deref(), Some("esc:0x9"));
        assert_eq!(mktag(EscClass::Heap.bits()), None);
        assert_eq!(mktag(EscClass::Scope.bits()), None);
        assert_eq!(mktag(EscClass::Unknown.bits()), None);

        for e in [1, 9, 0x12, 0x22, 0x1a, 0x92, 0x2002] {
            let tag = mktag(e);
            assert_eq!(parsetag(tag.as_deref()), e);
        }
    }

    #[test]
    fn parse_missing_or_malformed() {
        assert_eq!(parsetag(None), EscClass::Unknown.bits());
        assert_eq!(parsetag(Some("noescape")), EscClass::Unknown.bits());
        assert_eq!(parsetag(Some("esc:0xzz")), EscClass::Unknown.bits());
        assert_eq!(parsetag(Some("esc:0x0")), EscClass::None.bits());
        assert_eq!(parsetag(Some("esc:18")), 0x12);
    }

    #[test]
    fn describe() {
        assert_eq!(describe_escape(0), "EscUnknown");
        assert_eq!(describe_escape(1), "EscNone");
        assert_eq!(describe_escape(4), "EscHeap");
        assert_eq!(describe_escape(0x9), "EscNone contentToHeap");
        assert_eq!(describe_escape(0x12), "EscReturn =");
        assert_eq!(describe_escape(0x32), "EscReturn **");
        assert_eq!(describe_escape(0x82), "EscReturn _ =");
        assert_eq!(describe_escape(0x2a), "EscReturn contentToHeap *");
    }
}
