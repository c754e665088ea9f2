//! Bundled catalog served when the API is unreachable.

use crate::models::{Course, Difficulty, Lesson};

pub fn courses() -> Vec<Course> {
    vec![
        course(
            1,
            "Introduction to Programming",
            "Core programming concepts: values, control flow and functions.",
            "fundamentals",
        ),
        course(
            2,
            "Web Development Basics",
            "HTML, CSS and the request/response cycle from the ground up.",
            "web",
        ),
        course(
            3,
            "Data Structures",
            "Arrays, maps, trees and when to reach for each.",
            "fundamentals",
        ),
        course(
            4,
            "Databases 101",
            "Relational modelling, SQL and transactions.",
            "data",
        ),
    ]
}

pub fn lessons() -> Vec<Lesson> {
    vec![
        lesson(101, 1, "Variables and Types", Difficulty::Easy, 1),
        lesson(102, 1, "Control Flow", Difficulty::Easy, 2),
        lesson(103, 1, "Functions", Difficulty::Medium, 3),
        lesson(104, 1, "Error Handling", Difficulty::Medium, 4),
        lesson(201, 2, "HTML Structure", Difficulty::Easy, 1),
        lesson(202, 2, "Styling with CSS", Difficulty::Easy, 2),
        lesson(203, 2, "HTTP Basics", Difficulty::Medium, 3),
        lesson(301, 3, "Arrays and Lists", Difficulty::Easy, 1),
        lesson(302, 3, "Hash Maps", Difficulty::Medium, 2),
        lesson(401, 4, "Tables and Rows", Difficulty::Easy, 1),
        lesson(402, 4, "Joins", Difficulty::Hard, 2),
    ]
}

pub fn lessons_for_course(course_id: i64) -> Vec<Lesson> {
    lessons()
        .into_iter()
        .filter(|lesson| lesson.course_id == course_id)
        .collect()
}

fn course(id: i64, title: &str, description: &str, category: &str) -> Course {
    Course {
        id,
        title: title.to_string(),
        description: description.to_string(),
        category: Some(category.to_string()),
        image_url: None,
    }
}

fn lesson(id: i64, course_id: i64, title: &str, difficulty: Difficulty, order: i64) -> Lesson {
    Lesson {
        id,
        course_id,
        title: title.to_string(),
        description: None,
        content: None,
        difficulty: Some(difficulty),
        image_url: None,
        order,
    }
}
