pub mod head;

pub use head::{read_response_head, HttpError, RequestHead, ResponseHead, MAX_HEAD_SIZE};
