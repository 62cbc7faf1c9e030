mod engine;
mod fixtures;
mod matcher;
