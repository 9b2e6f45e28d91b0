//! Interned names, shared by the middle end and the back end.

/// A symbol, label, or function name.
///
/// The emitters only ever look at names; they never own or free their
/// storage. Interning makes the handle `Copy`, so instructions carrying an
/// `Id` can be reordered by LICM and dropped after emission without any
/// lifetime tie to a name arena, and two mentions of the same symbol
/// compare as cheaply as integers.
pub type Id = internment::Intern<String>;

/// Intern a string slice as an [Id].
pub fn id(s: &str) -> Id {
    Id::new(s.to_string())
}
