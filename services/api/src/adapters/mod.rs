pub mod chat_llm;
pub mod db;
pub mod functions;
pub mod realtime;
pub mod storage;
pub mod webhook;

pub use chat_llm::OpenAiChatAdapter;
pub use db::DbAdapter;
pub use functions::HttpFunctionsAdapter;
pub use realtime::PgChangeFeed;
pub use storage::ObjectStorageAdapter;
pub use webhook::{NoopNotifier, WebhookNotifier};
