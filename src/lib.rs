// Market Chatbot - Library root for testing

pub mod chat;
pub mod chunker;
pub mod config;
pub mod email;
pub mod error;
pub mod extraction;
pub mod http_client;
pub mod ingest;
pub mod middleware;
pub mod models;
pub mod openai;
pub mod parser;
pub mod pinecone;
pub mod prompts;
pub mod rag;
pub mod routes;
pub mod sse;
pub mod supabase;
pub mod validators;
