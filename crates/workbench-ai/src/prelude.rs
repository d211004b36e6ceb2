pub use crate::{
    ChatClient, ChatMessage, ChatRole, FrameConfig, HttpServices, ReplyStream, StreamError,
    StreamEvent, StreamFrameReader,
};
