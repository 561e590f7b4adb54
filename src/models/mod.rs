pub mod chat;
pub mod documents;
pub mod openai;
pub mod pinecone;
pub mod user;
