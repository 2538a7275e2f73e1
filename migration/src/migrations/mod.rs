pub mod m202601050001_create_users;
pub mod m202601050002_create_classes;
pub mod m202601050003_create_enrollments;
pub mod m202601050004_create_class_sessions;
pub mod m202601050005_create_attendance_records;
