pub mod console;
pub mod html;
pub mod markdown;
