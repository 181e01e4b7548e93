mod common;
mod config_tests;
mod crawl_tests;
mod extract_tests;
mod inference_tests;
