mod cursor;

pub use cursor::PageCursor;
