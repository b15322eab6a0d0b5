//! Language extractors

pub mod ecmascript;

use crate::extractor::LanguageExtractor;
use crate::parser_pool::FileType;

static TYPESCRIPT: ecmascript::EcmaScriptExtractor = ecmascript::EcmaScriptExtractor::new(true);
static JAVASCRIPT: ecmascript::EcmaScriptExtractor = ecmascript::EcmaScriptExtractor::new(false);

/// Get the extractor for a parsed file's grammar
pub fn get_extractor(file_type: FileType) -> &'static dyn LanguageExtractor {
    if file_type.is_typescript() { &TYPESCRIPT } else { &JAVASCRIPT }
}
