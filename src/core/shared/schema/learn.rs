diesel::table! {
    learn_users (id) {
        id -> Uuid,
        name -> Text,
        email -> Text,
        role -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    learn_user_profiles (user_id) {
        user_id -> Uuid,
        bio -> Nullable<Text>,
        points -> Int4,
        total_courses_completed -> Int4,
        total_hours_learned -> Int4,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    learn_categories (id) {
        id -> Uuid,
        name -> Text,
        slug -> Text,
        description -> Nullable<Text>,
        icon -> Nullable<Text>,
        color -> Nullable<Text>,
        parent_id -> Nullable<Uuid>,
        sort_order -> Int4,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    learn_courses (id) {
        id -> Uuid,
        title -> Text,
        slug -> Text,
        description -> Text,
        short_description -> Text,
        thumbnail_url -> Nullable<Text>,
        preview_video_url -> Nullable<Text>,
        instructor_id -> Uuid,
        category_id -> Uuid,
        level -> Text,
        status -> Text,
        is_free -> Bool,
        price -> Numeric,
        requirements -> Jsonb,
        what_you_will_learn -> Jsonb,
        tags -> Jsonb,
        language -> Text,
        duration_minutes -> Int4,
        total_lessons -> Int4,
        total_students -> Int4,
        average_rating -> Float8,
        total_ratings -> Int4,
        published_at -> Nullable<Timestamptz>,
        featured_until -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    learn_course_sections (id) {
        id -> Uuid,
        course_id -> Uuid,
        title -> Text,
        description -> Nullable<Text>,
        sort_order -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    learn_lessons (id) {
        id -> Uuid,
        course_id -> Uuid,
        section_id -> Uuid,
        title -> Text,
        slug -> Text,
        description -> Nullable<Text>,
        lesson_type -> Text,
        content -> Nullable<Text>,
        video_url -> Nullable<Text>,
        duration_seconds -> Int4,
        sort_order -> Int4,
        is_published -> Bool,
        is_free -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    learn_enrollments (id) {
        id -> Uuid,
        user_id -> Uuid,
        course_id -> Uuid,
        price_paid -> Numeric,
        status -> Text,
        progress_percentage -> Float8,
        completed_lessons -> Int4,
        total_lessons -> Int4,
        started_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
        expires_at -> Nullable<Timestamptz>,
        last_accessed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    learn_lesson_progress (id) {
        id -> Uuid,
        user_id -> Uuid,
        course_id -> Uuid,
        lesson_id -> Uuid,
        is_completed -> Bool,
        watch_time_seconds -> Int4,
        total_duration_seconds -> Int4,
        completion_percentage -> Float8,
        started_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
        last_accessed_at -> Timestamptz,
    }
}

diesel::table! {
    learn_course_ratings (id) {
        id -> Uuid,
        user_id -> Uuid,
        course_id -> Uuid,
        rating -> Int4,
        review -> Nullable<Text>,
        is_published -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    learn_discussions (id) {
        id -> Uuid,
        course_id -> Uuid,
        lesson_id -> Nullable<Uuid>,
        user_id -> Uuid,
        title -> Text,
        content -> Text,
        is_pinned -> Bool,
        is_resolved -> Bool,
        replies_count -> Int4,
        likes_count -> Int4,
        last_activity_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    learn_discussion_replies (id) {
        id -> Uuid,
        discussion_id -> Uuid,
        user_id -> Uuid,
        parent_id -> Nullable<Uuid>,
        depth -> Int4,
        content -> Text,
        likes_count -> Int4,
        is_solution -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    learn_certificates (id) {
        id -> Uuid,
        certificate_number -> Text,
        user_id -> Uuid,
        course_id -> Uuid,
        student_name -> Text,
        course_title -> Text,
        instructor_name -> Text,
        completion_date -> Timestamptz,
        issued_date -> Timestamptz,
        verification_url -> Text,
        metadata -> Jsonb,
    }
}

diesel::table! {
    learn_badges (id) {
        id -> Uuid,
        name -> Text,
        slug -> Text,
        description -> Nullable<Text>,
        icon -> Nullable<Text>,
        color -> Nullable<Text>,
        badge_type -> Text,
        criteria -> Jsonb,
        points_reward -> Int4,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    learn_user_badges (id) {
        id -> Uuid,
        user_id -> Uuid,
        badge_id -> Uuid,
        earned_at -> Timestamptz,
        reason -> Nullable<Text>,
    }
}

diesel::joinable!(learn_courses -> learn_categories (category_id));
diesel::joinable!(learn_courses -> learn_users (instructor_id));
diesel::joinable!(learn_course_sections -> learn_courses (course_id));
diesel::joinable!(learn_lessons -> learn_courses (course_id));
diesel::joinable!(learn_lessons -> learn_course_sections (section_id));
diesel::joinable!(learn_enrollments -> learn_courses (course_id));
diesel::joinable!(learn_lesson_progress -> learn_lessons (lesson_id));
diesel::joinable!(learn_course_ratings -> learn_courses (course_id));
diesel::joinable!(learn_discussion_replies -> learn_discussions (discussion_id));
diesel::joinable!(learn_user_badges -> learn_badges (badge_id));

diesel::allow_tables_to_appear_in_same_query!(
    learn_users,
    learn_user_profiles,
    learn_categories,
    learn_courses,
    learn_course_sections,
    learn_lessons,
    learn_enrollments,
    learn_lesson_progress,
    learn_course_ratings,
    learn_discussions,
    learn_discussion_replies,
    learn_certificates,
    learn_badges,
    learn_user_badges,
);
