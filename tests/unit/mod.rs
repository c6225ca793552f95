mod config_tests;
mod sink_tests;
mod stream_tests;
