pub mod recorder;
pub mod types;

pub use recorder::{parse_form, RequestRecorder};
pub use types::{CapturedRequest, FormFields, HeaderSnapshot, ParsedForm, RawRequest};
