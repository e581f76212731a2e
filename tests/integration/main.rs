//! Integration tests for Resume-Crawl

mod http_session_tests;
mod supervisor_tests;
