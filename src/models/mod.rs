pub mod course;
pub mod lesson;
pub mod progress;

pub use course::Course;
pub use lesson::{Difficulty, Lesson};
pub use progress::ProgressRecord;
