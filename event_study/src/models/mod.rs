pub mod bar;
pub mod event;
pub mod results;
pub mod window_spec;
