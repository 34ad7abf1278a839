mod comp;
mod filter;


pub use comp::{GmmuComp, GmmuStats};
pub use filter::{decode_key, encode_key, TranslationFilter};
