/// Binary decoding layers, leaf-first:
///
/// ```text
///   record     fixed-width primitives over a byte slice
///      │
///   fortran    length-framed sequential records
///      │
///   modeshape  HAWCStab2 mode-shape hierarchy
/// ```
pub mod fortran;
pub mod modeshape;
pub mod record;
