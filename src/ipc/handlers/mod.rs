pub mod activities;
pub mod core;
pub mod enrollments;
pub mod exams;
pub mod groups;
pub mod rules;
pub mod special_courses;
pub mod students;
pub mod subjects;
pub mod teachers;
