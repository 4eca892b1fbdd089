use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::*;
use crate::learn::progress::apply_watch;
use crate::learn::ratings::average_rating;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    profiles: HashMap<Uuid, UserProfile>,
    categories: HashMap<Uuid, Category>,
    courses: HashMap<Uuid, Course>,
    sections: HashMap<Uuid, CourseSection>,
    lessons: HashMap<Uuid, Lesson>,
    enrollments: HashMap<Uuid, Enrollment>,
    lesson_progress: HashMap<(Uuid, Uuid), LessonProgress>,
    ratings: HashMap<Uuid, CourseRating>,
    discussions: HashMap<Uuid, Discussion>,
    replies: HashMap<Uuid, DiscussionReply>,
    certificates: HashMap<Uuid, Certificate>,
    badges: HashMap<Uuid, Badge>,
    user_badges: HashMap<Uuid, UserBadge>,
}

impl Tables {
    fn course_mut(&mut self, id: Uuid) -> StoreResult<&mut Course> {
        self.courses.get_mut(&id).ok_or(StoreError::NotFound)
    }

    fn enrollment_mut(&mut self, id: Uuid) -> StoreResult<&mut Enrollment> {
        self.enrollments.get_mut(&id).ok_or(StoreError::NotFound)
    }

    fn profile_mut(&mut self, user_id: Uuid, at: DateTime<Utc>) -> &mut UserProfile {
        self.profiles
            .entry(user_id)
            .or_insert_with(|| UserProfile::empty(user_id, at))
    }

    fn remove_discussions_where(&mut self, pred: impl Fn(&Discussion) -> bool) {
        let doomed: Vec<Uuid> = self
            .discussions
            .values()
            .filter(|d| pred(d))
            .map(|d| d.id)
            .collect();
        for id in &doomed {
            self.discussions.remove(id);
        }
        self.replies.retain(|_, r| !doomed.contains(&r.discussion_id));
    }
}

/// Process-local store used for tests and `storage.backend = "memory"`.
///
/// Every operation runs under one write (or read) guard, which makes each
/// call atomic the same way a single SQL statement is.
#[derive(Debug, Clone)]
pub struct InMemoryLearnStore {
    tables: Arc<RwLock<Tables>>,
}

impl Default for InMemoryLearnStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLearnStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }
}

fn matches_listing(course: &Course, listing: &CourseListing, now: DateTime<Utc>) -> bool {
    if !course.is_published(now) {
        return false;
    }
    if listing.exclude_course == Some(course.id) {
        return false;
    }
    if listing.featured_only && !course.is_featured(now) {
        return false;
    }
    if let Some(category_id) = listing.category_id {
        if course.category_id != category_id {
            return false;
        }
    }
    if let Some(level) = listing.level {
        if course.level != level {
            return false;
        }
    }
    match listing.price_type {
        Some(PriceType::Free) if !course.is_free => return false,
        Some(PriceType::Paid) if course.is_free => return false,
        _ => {}
    }
    if let Some(term) = listing.search.as_deref() {
        let term = term.to_lowercase();
        let hit = [&course.title, &course.description, &course.short_description]
            .iter()
            .any(|text| text.to_lowercase().contains(&term));
        if !hit {
            return false;
        }
    }
    true
}

fn compare_courses(a: &Course, b: &Course, sort: CourseSort) -> Ordering {
    let primary = match sort {
        CourseSort::Popular => b
            .total_students
            .cmp(&a.total_students)
            .then_with(|| b.average_rating.total_cmp(&a.average_rating)),
        CourseSort::Newest => b.published_at.cmp(&a.published_at),
        CourseSort::Rating => b
            .average_rating
            .total_cmp(&a.average_rating)
            .then_with(|| b.total_ratings.cmp(&a.total_ratings)),
        CourseSort::PriceLow => a.price.cmp(&b.price),
        CourseSort::PriceHigh => b.price.cmp(&a.price),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

impl LearnStore for InMemoryLearnStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert_user(&self, user: User) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::UniqueViolation(USER_EMAIL_UNIQUE.into()));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn count_users_by_role(&self, role: Role) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().filter(|u| u.role == role).count() as i64)
    }

    async fn ensure_profile(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<UserProfile> {
        let mut tables = self.tables.write().await;
        Ok(tables.profile_mut(user_id, at).clone())
    }

    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<UserProfile>> {
        Ok(self.tables.read().await.profiles.get(&user_id).cloned())
    }

    async fn record_profile_completion(
        &self,
        user_id: Uuid,
        hours: i32,
        at: DateTime<Utc>,
    ) -> StoreResult<UserProfile> {
        let mut tables = self.tables.write().await;
        let profile = tables.profile_mut(user_id, at);
        profile.total_courses_completed += 1;
        profile.total_hours_learned += hours;
        profile.updated_at = at;
        Ok(profile.clone())
    }

    async fn add_profile_points(
        &self,
        user_id: Uuid,
        points: i32,
        at: DateTime<Utc>,
    ) -> StoreResult<UserProfile> {
        let mut tables = self.tables.write().await;
        let profile = tables.profile_mut(user_id, at);
        profile.points += points;
        profile.updated_at = at;
        Ok(profile.clone())
    }

    async fn insert_category(&self, category: Category) -> StoreResult<Category> {
        let mut tables = self.tables.write().await;
        if tables.categories.values().any(|c| c.slug == category.slug) {
            return Err(StoreError::UniqueViolation(CATEGORY_SLUG_UNIQUE.into()));
        }
        tables.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn get_category(&self, id: Uuid) -> StoreResult<Option<Category>> {
        Ok(self.tables.read().await.categories.get(&id).cloned())
    }

    async fn list_active_categories(&self) -> StoreResult<Vec<Category>> {
        let tables = self.tables.read().await;
        let mut categories: Vec<Category> = tables
            .categories
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        Ok(categories)
    }

    async fn count_published_by_category(&self, now: DateTime<Utc>) -> StoreResult<Vec<(Uuid, i64)>> {
        let tables = self.tables.read().await;
        let mut counts: HashMap<Uuid, i64> = HashMap::new();
        for course in tables.courses.values().filter(|c| c.is_published(now)) {
            *counts.entry(course.category_id).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn insert_course(&self, course: Course) -> StoreResult<Course> {
        let mut tables = self.tables.write().await;
        if tables.courses.values().any(|c| c.slug == course.slug) {
            return Err(StoreError::UniqueViolation(COURSE_SLUG_UNIQUE.into()));
        }
        tables.courses.insert(course.id, course.clone());
        Ok(course)
    }

    async fn get_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        Ok(self.tables.read().await.courses.get(&id).cloned())
    }

    async fn update_course_details(&self, course: Course) -> StoreResult<Course> {
        let mut tables = self.tables.write().await;
        if tables
            .courses
            .values()
            .any(|c| c.slug == course.slug && c.id != course.id)
        {
            return Err(StoreError::UniqueViolation(COURSE_SLUG_UNIQUE.into()));
        }
        let stored = tables.course_mut(course.id)?;
        stored.title = course.title;
        stored.slug = course.slug;
        stored.description = course.description;
        stored.short_description = course.short_description;
        stored.thumbnail_url = course.thumbnail_url;
        stored.preview_video_url = course.preview_video_url;
        stored.category_id = course.category_id;
        stored.level = course.level;
        stored.is_free = course.is_free;
        stored.price = course.price;
        stored.requirements = course.requirements;
        stored.what_you_will_learn = course.what_you_will_learn;
        stored.tags = course.tags;
        stored.language = course.language;
        stored.updated_at = course.updated_at;
        Ok(stored.clone())
    }

    async fn set_course_status(
        &self,
        id: Uuid,
        status: CourseStatus,
        published_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> StoreResult<Course> {
        let mut tables = self.tables.write().await;
        let course = tables.course_mut(id)?;
        course.status = status;
        course.published_at = published_at;
        course.updated_at = at;
        Ok(course.clone())
    }

    async fn set_course_featured(
        &self,
        id: Uuid,
        until: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> StoreResult<Course> {
        let mut tables = self.tables.write().await;
        let course = tables.course_mut(id)?;
        course.featured_until = until;
        course.updated_at = at;
        Ok(course.clone())
    }

    async fn delete_course(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.courses.remove(&id).is_none() {
            return Ok(false);
        }
        tables.sections.retain(|_, s| s.course_id != id);
        tables.lessons.retain(|_, l| l.course_id != id);
        tables.enrollments.retain(|_, e| e.course_id != id);
        tables.lesson_progress.retain(|_, p| p.course_id != id);
        tables.ratings.retain(|_, r| r.course_id != id);
        tables.certificates.retain(|_, c| c.course_id != id);
        tables.remove_discussions_where(|d| d.course_id == id);
        Ok(true)
    }

    async fn list_published_courses(
        &self,
        listing: CourseListing,
        now: DateTime<Utc>,
    ) -> StoreResult<(Vec<Course>, i64)> {
        let tables = self.tables.read().await;
        let mut matching: Vec<&Course> = tables
            .courses
            .values()
            .filter(|c| matches_listing(c, &listing, now))
            .collect();
        matching.sort_by(|a, b| compare_courses(a, b, listing.sort));
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(listing.offset.max(0) as usize)
            .take(listing.limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn published_catalog_totals(&self, now: DateTime<Utc>) -> StoreResult<CatalogTotals> {
        let tables = self.tables.read().await;
        let mut totals = CatalogTotals::default();
        for course in tables.courses.values().filter(|c| c.is_published(now)) {
            totals.published_courses += 1;
            totals.published_minutes += i64::from(course.duration_minutes);
        }
        Ok(totals)
    }

    async fn increment_course_students(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.course_mut(id)?.total_students += 1;
        Ok(())
    }

    async fn refresh_rating_aggregate(&self, course_id: Uuid, count_new: bool) -> StoreResult<Course> {
        let mut tables = self.tables.write().await;
        let values: Vec<i32> = tables
            .ratings
            .values()
            .filter(|r| r.course_id == course_id && r.is_published)
            .map(|r| r.rating)
            .collect();
        let average = average_rating(&values);
        let course = tables.course_mut(course_id)?;
        course.average_rating = average;
        if count_new {
            course.total_ratings += 1;
        }
        Ok(course.clone())
    }

    async fn refresh_course_totals(&self, course_id: Uuid, at: DateTime<Utc>) -> StoreResult<Course> {
        let mut tables = self.tables.write().await;
        let (count, seconds) = tables
            .lessons
            .values()
            .filter(|l| l.course_id == course_id)
            .fold((0i32, 0i64), |(n, secs), l| (n + 1, secs + i64::from(l.duration_seconds)));
        let course = tables.course_mut(course_id)?;
        course.total_lessons = count;
        course.duration_minutes = (seconds / 60) as i32;
        course.updated_at = at;
        Ok(course.clone())
    }

    async fn insert_section(&self, section: CourseSection) -> StoreResult<CourseSection> {
        let mut tables = self.tables.write().await;
        tables.sections.insert(section.id, section.clone());
        Ok(section)
    }

    async fn get_section(&self, id: Uuid) -> StoreResult<Option<CourseSection>> {
        Ok(self.tables.read().await.sections.get(&id).cloned())
    }

    async fn list_sections(&self, course_id: Uuid) -> StoreResult<Vec<CourseSection>> {
        let tables = self.tables.read().await;
        let mut sections: Vec<CourseSection> = tables
            .sections
            .values()
            .filter(|s| s.course_id == course_id)
            .cloned()
            .collect();
        sections.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(sections)
    }

    async fn next_lesson_sort_order(&self, section_id: Uuid) -> StoreResult<i32> {
        let tables = self.tables.read().await;
        Ok(tables
            .lessons
            .values()
            .filter(|l| l.section_id == section_id)
            .map(|l| l.sort_order)
            .max()
            .map_or(1, |max| max + 1))
    }

    async fn insert_lesson(&self, lesson: Lesson) -> StoreResult<Lesson> {
        let mut tables = self.tables.write().await;
        if tables
            .lessons
            .values()
            .any(|l| l.course_id == lesson.course_id && l.slug == lesson.slug)
        {
            return Err(StoreError::UniqueViolation(LESSON_SLUG_UNIQUE.into()));
        }
        tables.lessons.insert(lesson.id, lesson.clone());
        Ok(lesson)
    }

    async fn get_lesson(&self, id: Uuid) -> StoreResult<Option<Lesson>> {
        Ok(self.tables.read().await.lessons.get(&id).cloned())
    }

    async fn list_lessons(&self, course_id: Uuid) -> StoreResult<Vec<Lesson>> {
        let tables = self.tables.read().await;
        let mut lessons: Vec<Lesson> = tables
            .lessons
            .values()
            .filter(|l| l.course_id == course_id)
            .cloned()
            .collect();
        lessons.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(lessons)
    }

    async fn delete_lesson(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.lessons.remove(&id).is_none() {
            return Ok(false);
        }
        tables.lesson_progress.retain(|(_, lesson_id), _| *lesson_id != id);
        tables.remove_discussions_where(|d| d.lesson_id == Some(id));
        Ok(true)
    }

    async fn insert_enrollment(&self, enrollment: Enrollment) -> StoreResult<Enrollment> {
        let mut tables = self.tables.write().await;
        if tables
            .enrollments
            .values()
            .any(|e| e.user_id == enrollment.user_id && e.course_id == enrollment.course_id)
        {
            return Err(StoreError::UniqueViolation(ENROLLMENT_UNIQUE.into()));
        }
        tables.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(enrollment)
    }

    async fn find_enrollment(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<Option<Enrollment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .enrollments
            .values()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
            .cloned())
    }

    async fn list_user_enrollments(&self, user_id: Uuid) -> StoreResult<Vec<Enrollment>> {
        let tables = self.tables.read().await;
        let mut enrollments: Vec<Enrollment> = tables
            .enrollments
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        enrollments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(enrollments)
    }

    async fn transition_enrollment(
        &self,
        id: Uuid,
        from: EnrollmentStatus,
        to: EnrollmentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Enrollment>> {
        let mut tables = self.tables.write().await;
        let enrollment = tables.enrollment_mut(id)?;
        if enrollment.status != from {
            return Ok(None);
        }
        enrollment.status = to;
        if to == EnrollmentStatus::Completed {
            enrollment.completed_at = Some(at);
        }
        enrollment.updated_at = at;
        Ok(Some(enrollment.clone()))
    }

    async fn list_due_enrollments(&self, now: DateTime<Utc>) -> StoreResult<Vec<Enrollment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .enrollments
            .values()
            .filter(|e| e.is_due_for_expiry(now))
            .cloned()
            .collect())
    }

    async fn increment_completed_lessons(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<Enrollment> {
        let mut tables = self.tables.write().await;
        let enrollment = tables.enrollment_mut(id)?;
        if enrollment.completed_lessons < enrollment.total_lessons {
            enrollment.completed_lessons += 1;
        }
        enrollment.last_accessed_at = Some(at);
        enrollment.updated_at = at;
        Ok(enrollment.clone())
    }

    async fn raise_enrollment_progress(
        &self,
        id: Uuid,
        percentage: f64,
        at: DateTime<Utc>,
    ) -> StoreResult<Enrollment> {
        let mut tables = self.tables.write().await;
        let enrollment = tables.enrollment_mut(id)?;
        if percentage > enrollment.progress_percentage {
            enrollment.progress_percentage = percentage;
            enrollment.updated_at = at;
        }
        Ok(enrollment.clone())
    }

    async fn touch_enrollment(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<Enrollment> {
        let mut tables = self.tables.write().await;
        let enrollment = tables.enrollment_mut(id)?;
        enrollment.last_accessed_at = Some(at);
        Ok(enrollment.clone())
    }

    async fn record_lesson_watch(&self, watch: LessonWatch) -> StoreResult<LessonWatchOutcome> {
        let mut tables = self.tables.write().await;
        let progress = tables
            .lesson_progress
            .entry((watch.user_id, watch.lesson_id))
            .or_insert_with(|| LessonProgress::started(&watch));
        let newly_completed = apply_watch(progress, &watch);
        Ok(LessonWatchOutcome {
            progress: progress.clone(),
            newly_completed,
        })
    }

    async fn list_lesson_progress(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<Vec<LessonProgress>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<LessonProgress> = tables
            .lesson_progress
            .values()
            .filter(|p| p.user_id == user_id && p.course_id == course_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(rows)
    }

    async fn insert_rating(&self, rating: CourseRating) -> StoreResult<CourseRating> {
        let mut tables = self.tables.write().await;
        if tables
            .ratings
            .values()
            .any(|r| r.user_id == rating.user_id && r.course_id == rating.course_id)
        {
            return Err(StoreError::UniqueViolation(RATING_UNIQUE.into()));
        }
        tables.ratings.insert(rating.id, rating.clone());
        Ok(rating)
    }

    async fn get_rating(&self, id: Uuid) -> StoreResult<Option<CourseRating>> {
        Ok(self.tables.read().await.ratings.get(&id).cloned())
    }

    async fn set_rating_published(
        &self,
        id: Uuid,
        published: bool,
        at: DateTime<Utc>,
    ) -> StoreResult<CourseRating> {
        let mut tables = self.tables.write().await;
        let rating = tables.ratings.get_mut(&id).ok_or(StoreError::NotFound)?;
        rating.is_published = published;
        rating.updated_at = at;
        Ok(rating.clone())
    }

    async fn list_published_ratings(&self, course_id: Uuid, limit: i64) -> StoreResult<Vec<CourseRating>> {
        let tables = self.tables.read().await;
        let mut ratings: Vec<CourseRating> = tables
            .ratings
            .values()
            .filter(|r| r.course_id == course_id && r.is_published)
            .cloned()
            .collect();
        ratings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        ratings.truncate(limit.max(0) as usize);
        Ok(ratings)
    }

    async fn insert_discussion(&self, discussion: Discussion) -> StoreResult<Discussion> {
        let mut tables = self.tables.write().await;
        tables.discussions.insert(discussion.id, discussion.clone());
        Ok(discussion)
    }

    async fn get_discussion(&self, id: Uuid) -> StoreResult<Option<Discussion>> {
        Ok(self.tables.read().await.discussions.get(&id).cloned())
    }

    async fn list_discussions(&self, course_id: Uuid) -> StoreResult<Vec<Discussion>> {
        let tables = self.tables.read().await;
        let mut discussions: Vec<Discussion> = tables
            .discussions
            .values()
            .filter(|d| d.course_id == course_id)
            .cloned()
            .collect();
        discussions.sort_by(|a, b| {
            b.is_pinned
                .cmp(&a.is_pinned)
                .then_with(|| b.last_activity_at.cmp(&a.last_activity_at))
        });
        Ok(discussions)
    }

    async fn insert_reply(&self, reply: DiscussionReply) -> StoreResult<DiscussionReply> {
        let mut tables = self.tables.write().await;
        tables.replies.insert(reply.id, reply.clone());
        Ok(reply)
    }

    async fn get_reply(&self, id: Uuid) -> StoreResult<Option<DiscussionReply>> {
        Ok(self.tables.read().await.replies.get(&id).cloned())
    }

    async fn list_replies(&self, discussion_id: Uuid) -> StoreResult<Vec<DiscussionReply>> {
        let tables = self.tables.read().await;
        let mut replies: Vec<DiscussionReply> = tables
            .replies
            .values()
            .filter(|r| r.discussion_id == discussion_id)
            .cloned()
            .collect();
        replies.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(replies)
    }

    async fn bump_discussion_activity(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<Discussion> {
        let mut tables = self.tables.write().await;
        let discussion = tables.discussions.get_mut(&id).ok_or(StoreError::NotFound)?;
        discussion.replies_count += 1;
        discussion.last_activity_at = at;
        Ok(discussion.clone())
    }

    async fn mark_solution(&self, discussion_id: Uuid, reply_id: Uuid) -> StoreResult<Discussion> {
        let mut tables = self.tables.write().await;
        let reply = tables.replies.get_mut(&reply_id).ok_or(StoreError::NotFound)?;
        reply.is_solution = true;
        let discussion = tables
            .discussions
            .get_mut(&discussion_id)
            .ok_or(StoreError::NotFound)?;
        discussion.is_resolved = true;
        Ok(discussion.clone())
    }

    async fn insert_certificate(&self, certificate: Certificate) -> StoreResult<Certificate> {
        let mut tables = self.tables.write().await;
        if tables.certificates.values().any(|c| {
            (c.user_id == certificate.user_id && c.course_id == certificate.course_id)
                || c.certificate_number == certificate.certificate_number
        }) {
            return Err(StoreError::UniqueViolation(CERTIFICATE_UNIQUE.into()));
        }
        tables.certificates.insert(certificate.id, certificate.clone());
        Ok(certificate)
    }

    async fn find_certificate(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<Option<Certificate>> {
        let tables = self.tables.read().await;
        Ok(tables
            .certificates
            .values()
            .find(|c| c.user_id == user_id && c.course_id == course_id)
            .cloned())
    }

    async fn find_certificate_by_number(&self, number: &str) -> StoreResult<Option<Certificate>> {
        let tables = self.tables.read().await;
        Ok(tables
            .certificates
            .values()
            .find(|c| c.certificate_number == number)
            .cloned())
    }

    async fn list_user_certificates(&self, user_id: Uuid) -> StoreResult<Vec<Certificate>> {
        let tables = self.tables.read().await;
        let mut certificates: Vec<Certificate> = tables
            .certificates
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        certificates.sort_by(|a, b| b.issued_date.cmp(&a.issued_date));
        Ok(certificates)
    }

    async fn insert_badge(&self, badge: Badge) -> StoreResult<Badge> {
        let mut tables = self.tables.write().await;
        if tables.badges.values().any(|b| b.slug == badge.slug) {
            return Err(StoreError::UniqueViolation(BADGE_SLUG_UNIQUE.into()));
        }
        tables.badges.insert(badge.id, badge.clone());
        Ok(badge)
    }

    async fn list_active_badges(&self, badge_type: BadgeType) -> StoreResult<Vec<Badge>> {
        let tables = self.tables.read().await;
        let mut badges: Vec<Badge> = tables
            .badges
            .values()
            .filter(|b| b.is_active && b.badge_type == badge_type)
            .cloned()
            .collect();
        badges.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(badges)
    }

    async fn insert_user_badge(&self, user_badge: UserBadge) -> StoreResult<UserBadge> {
        let mut tables = self.tables.write().await;
        if tables
            .user_badges
            .values()
            .any(|b| b.user_id == user_badge.user_id && b.badge_id == user_badge.badge_id)
        {
            return Err(StoreError::UniqueViolation(USER_BADGE_UNIQUE.into()));
        }
        tables.user_badges.insert(user_badge.id, user_badge.clone());
        Ok(user_badge)
    }

    async fn list_user_badges(&self, user_id: Uuid) -> StoreResult<Vec<UserBadge>> {
        let tables = self.tables.read().await;
        let mut badges: Vec<UserBadge> = tables
            .user_badges
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        badges.sort_by(|a, b| a.earned_at.cmp(&b.earned_at));
        Ok(badges)
    }
}
