// Integration-style tests exercising whole pipelines end to end.

mod encryption_tests;
mod logger_tests;
mod pipeline_tests;
mod rotation_tests;
