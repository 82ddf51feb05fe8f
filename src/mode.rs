//! The decoding mode.

use serde::Deserialize;


//------------ Mode ----------------------------------------------------------

/// The encoding rules data is checked against.
///
/// Decoders always accept whatever they can make sense of. The mode only
/// decides which encoding variants are reported as errors.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Basic Encoding Rules.
    ///
    /// These are the most flexible rules, allowing alternative encodings
    /// for some types as well as indefinite length values.
    #[default]
    Ber,

    /// Distinguished Encoding Rules.
    ///
    /// These rules always employ definite length values and require the
    /// shortest possible encoding.
    Der,
}

impl Mode {
    /// Is this mode one of the restricted rules?
    pub fn is_restricted(self) -> bool {
        matches!(self, Mode::Der)
    }

    /// Does this mode allow indefinite length constructed values?
    pub fn allows_indefinite(self) -> bool {
        matches!(self, Mode::Ber)
    }
}
