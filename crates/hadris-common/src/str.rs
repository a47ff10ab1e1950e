/// `d-character`/`a-character` predicates shared by ECMA-119 name codecs.
pub mod ascii;
/// Fixed and variable width UTF-16 strings (GPT partition names, Joliet names).
pub mod utf16;
