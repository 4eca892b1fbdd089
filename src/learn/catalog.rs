use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::error::LearnError;
use super::roles::{require, require_owner, Capability};
use super::store::{
    LearnStore, CATEGORY_SLUG_UNIQUE, COURSE_SLUG_UNIQUE, LESSON_SLUG_UNIQUE,
};
use super::types::*;
use crate::core::shared::utils::slugify;

const MAX_PER_PAGE: i64 = 100;
const MAX_PRICE: f64 = 9999.99;
const DETAIL_RATINGS: i64 = 10;
const SIMILAR_COURSES: i64 = 4;

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), LearnError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(LearnError::Validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

fn check_items(field: &str, items: &[String], max: usize) -> Result<(), LearnError> {
    if items.iter().any(|item| item.chars().count() > max) {
        return Err(LearnError::Validation(format!(
            "each {field} entry must be at most {max} characters"
        )));
    }
    Ok(())
}

/// Free courses are always priced at zero; paid ones need 0..=9999.99.
pub fn course_price(is_free: bool, price: Option<f64>) -> Result<BigDecimal, LearnError> {
    if is_free {
        return Ok(BigDecimal::from(0));
    }
    let price = price.ok_or_else(|| {
        LearnError::Validation("price is required for paid courses".to_string())
    })?;
    if !price.is_finite() || !(0.0..=MAX_PRICE).contains(&price) {
        return Err(LearnError::Validation(format!(
            "price must be between 0 and {MAX_PRICE}"
        )));
    }
    format!("{price:.2}")
        .parse()
        .map_err(|e| LearnError::Validation(format!("invalid price: {e}")))
}

fn validate_course(course: &Course) -> Result<(), LearnError> {
    check_length("title", &course.title, 1, 255)?;
    check_length("short_description", &course.short_description, 1, 500)?;
    if course.description.trim().is_empty() {
        return Err(LearnError::Validation("description is required".to_string()));
    }
    check_length("language", &course.language, 1, 10)?;
    check_items("tag", &course.tags, 50)?;
    check_items("requirement", &course.requirements, 255)?;
    check_items("learning outcome", &course.what_you_will_learn, 255)?;
    if course.slug.is_empty() {
        return Err(LearnError::Validation(
            "title must contain at least one letter or digit".to_string(),
        ));
    }
    Ok(())
}

fn total_pages(total: i64, per_page: i64) -> i64 {
    if total == 0 {
        0
    } else {
        (total + per_page - 1) / per_page
    }
}

pub struct Catalog<S> {
    store: Arc<S>,
    courses_per_page: i64,
}

impl<S> Clone for Catalog<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            courses_per_page: self.courses_per_page,
        }
    }
}

impl<S: LearnStore> Catalog<S> {
    pub fn new(store: Arc<S>, courses_per_page: i64) -> Self {
        Self {
            store,
            courses_per_page,
        }
    }

    async fn course(&self, id: Uuid) -> Result<Course, LearnError> {
        self.store
            .get_course(id)
            .await?
            .ok_or_else(|| LearnError::not_found("course", id))
    }

    async fn active_category(&self, id: Uuid) -> Result<Category, LearnError> {
        self.store
            .get_category(id)
            .await?
            .filter(|category| category.is_active)
            .ok_or_else(|| LearnError::Validation(format!("category {id} does not exist")))
    }

    // ----- Categories -----

    pub async fn create_category(
        &self,
        actor: &User,
        req: CreateCategoryRequest,
    ) -> Result<Category, LearnError> {
        require(actor, Capability::ManageCategories)?;

        let name = req.name.trim();
        check_length("name", name, 1, 100)?;
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(LearnError::Validation(
                "name must contain at least one letter or digit".to_string(),
            ));
        }
        if let Some(parent_id) = req.parent_id {
            self.active_category(parent_id).await?;
        }

        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug,
            description: req.description,
            icon: req.icon,
            color: req.color,
            parent_id: req.parent_id,
            sort_order: req.sort_order.unwrap_or(0),
            is_active: true,
            created_at: Utc::now(),
        };
        match self.store.insert_category(category).await {
            Ok(category) => Ok(category),
            Err(e) if e.violates(CATEGORY_SLUG_UNIQUE) => Err(LearnError::Validation(
                "a category with this name already exists".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_categories(&self, now: DateTime<Utc>) -> Result<Vec<CategoryWithCount>, LearnError> {
        let counts: HashMap<Uuid, i64> = self
            .store
            .count_published_by_category(now)
            .await?
            .into_iter()
            .collect();
        Ok(self
            .store
            .list_active_categories()
            .await?
            .into_iter()
            .map(|category| CategoryWithCount {
                published_courses: counts.get(&category.id).copied().unwrap_or(0),
                category,
            })
            .collect())
    }

    // ----- Courses -----

    pub async fn create_course(&self, actor: &User, req: CreateCourseRequest) -> Result<Course, LearnError> {
        require(actor, Capability::CreateCourses)?;
        self.active_category(req.category_id).await?;

        let now = Utc::now();
        let title = req.title.trim().to_string();
        let course = Course {
            id: Uuid::new_v4(),
            slug: slugify(&title),
            title,
            description: req.description,
            short_description: req.short_description.trim().to_string(),
            thumbnail_url: req.thumbnail_url,
            preview_video_url: req.preview_video_url,
            instructor_id: actor.id,
            category_id: req.category_id,
            level: req.level,
            status: CourseStatus::Draft,
            is_free: req.is_free,
            price: course_price(req.is_free, req.price)?,
            requirements: req.requirements,
            what_you_will_learn: req.what_you_will_learn,
            tags: req.tags,
            language: req.language.unwrap_or_else(|| "en".to_string()),
            duration_minutes: 0,
            total_lessons: 0,
            total_students: 0,
            average_rating: 0.0,
            total_ratings: 0,
            published_at: None,
            featured_until: None,
            created_at: now,
            updated_at: now,
        };
        validate_course(&course)?;

        match self.store.insert_course(course).await {
            Ok(course) => {
                info!("Course {} created by {}", course.id, actor.id);
                Ok(course)
            }
            Err(e) if e.violates(COURSE_SLUG_UNIQUE) => Err(LearnError::Validation(
                "a course with this title already exists".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update_course(
        &self,
        actor: &User,
        course_id: Uuid,
        req: UpdateCourseRequest,
    ) -> Result<Course, LearnError> {
        let mut course = self.course(course_id).await?;
        require_owner(actor, course.instructor_id, Capability::EditCourses)?;

        if let Some(title) = req.title {
            let title = title.trim().to_string();
            if title != course.title {
                course.slug = slugify(&title);
                course.title = title;
            }
        }
        if let Some(description) = req.description {
            course.description = description;
        }
        if let Some(short_description) = req.short_description {
            course.short_description = short_description.trim().to_string();
        }
        if let Some(category_id) = req.category_id {
            self.active_category(category_id).await?;
            course.category_id = category_id;
        }
        if let Some(level) = req.level {
            course.level = level;
        }
        if req.is_free.is_some() || req.price.is_some() {
            let is_free = req.is_free.unwrap_or(course.is_free);
            let current = course.price.to_string().parse::<f64>().ok();
            course.price = course_price(is_free, req.price.or(current))?;
            course.is_free = is_free;
        }
        if let Some(url) = req.thumbnail_url {
            course.thumbnail_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Some(url) = req.preview_video_url {
            course.preview_video_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Some(requirements) = req.requirements {
            course.requirements = requirements;
        }
        if let Some(outcomes) = req.what_you_will_learn {
            course.what_you_will_learn = outcomes;
        }
        if let Some(tags) = req.tags {
            course.tags = tags;
        }
        if let Some(language) = req.language {
            course.language = language;
        }
        course.updated_at = Utc::now();
        validate_course(&course)?;

        match self.store.update_course_details(course).await {
            Ok(course) => Ok(course),
            Err(e) if e.violates(COURSE_SLUG_UNIQUE) => Err(LearnError::Validation(
                "a course with this title already exists".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn move_course(&self, course: Course, next: CourseStatus) -> Result<Course, LearnError> {
        if !course.status.can_transition_to(next) {
            return Err(LearnError::transition(course.status, next));
        }
        let now = Utc::now();
        let published_at = if next == CourseStatus::Approved {
            course.published_at.or(Some(now))
        } else {
            course.published_at
        };
        let moved = self
            .store
            .set_course_status(course.id, next, published_at, now)
            .await?;
        info!("Course {} moved from {} to {}", course.id, course.status, next);
        Ok(moved)
    }

    pub async fn submit_for_review(&self, actor: &User, course_id: Uuid) -> Result<Course, LearnError> {
        let course = self.course(course_id).await?;
        require_owner(actor, course.instructor_id, Capability::EditCourses)?;
        self.move_course(course, CourseStatus::Pending).await
    }

    pub async fn approve(&self, actor: &User, course_id: Uuid) -> Result<Course, LearnError> {
        require(actor, Capability::ApproveCourses)?;
        let course = self.course(course_id).await?;
        self.move_course(course, CourseStatus::Approved).await
    }

    pub async fn reject(&self, actor: &User, course_id: Uuid) -> Result<Course, LearnError> {
        require(actor, Capability::ApproveCourses)?;
        let course = self.course(course_id).await?;
        self.move_course(course, CourseStatus::Rejected).await
    }

    pub async fn archive(&self, actor: &User, course_id: Uuid) -> Result<Course, LearnError> {
        let course = self.course(course_id).await?;
        require_owner(actor, course.instructor_id, Capability::EditCourses)?;
        self.move_course(course, CourseStatus::Archived).await
    }

    pub async fn set_featured(
        &self,
        actor: &User,
        course_id: Uuid,
        until: Option<DateTime<Utc>>,
    ) -> Result<Course, LearnError> {
        if actor.role != Role::Admin {
            return Err(LearnError::Forbidden(
                "only admins can feature courses".to_string(),
            ));
        }
        self.course(course_id).await?;
        Ok(self
            .store
            .set_course_featured(course_id, until, Utc::now())
            .await?)
    }

    pub async fn delete_course(&self, actor: &User, course_id: Uuid) -> Result<(), LearnError> {
        let course = self.course(course_id).await?;
        require_owner(actor, course.instructor_id, Capability::DeleteCourses)?;
        if !self.store.delete_course(course_id).await? {
            return Err(LearnError::not_found("course", course_id));
        }
        info!("Course {course_id} deleted by {}", actor.id);
        Ok(())
    }

    // ----- Sections & lessons -----

    pub async fn add_section(
        &self,
        actor: &User,
        course_id: Uuid,
        req: CreateSectionRequest,
    ) -> Result<CourseSection, LearnError> {
        let course = self.course(course_id).await?;
        require_owner(actor, course.instructor_id, Capability::EditCourses)?;
        let title = req.title.trim();
        check_length("title", title, 1, 255)?;

        let sort_order = match req.sort_order {
            Some(order) => order,
            None => self.store.list_sections(course_id).await?.len() as i32 + 1,
        };
        Ok(self
            .store
            .insert_section(CourseSection {
                id: Uuid::new_v4(),
                course_id,
                title: title.to_string(),
                description: req.description,
                sort_order,
                created_at: Utc::now(),
            })
            .await?)
    }

    pub async fn add_lesson(
        &self,
        actor: &User,
        course_id: Uuid,
        req: CreateLessonRequest,
    ) -> Result<Lesson, LearnError> {
        let course = self.course(course_id).await?;
        require_owner(actor, course.instructor_id, Capability::EditCourses)?;

        let section = self
            .store
            .get_section(req.section_id)
            .await?
            .filter(|section| section.course_id == course_id)
            .ok_or_else(|| {
                LearnError::Validation(format!(
                    "section {} is not part of course {course_id}",
                    req.section_id
                ))
            })?;

        let title = req.title.trim();
        check_length("title", title, 1, 255)?;
        let slug = slugify(title);
        if slug.is_empty() {
            return Err(LearnError::Validation(
                "title must contain at least one letter or digit".to_string(),
            ));
        }
        if req.duration_seconds < 0 {
            return Err(LearnError::Validation(
                "duration_seconds must not be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let lesson = Lesson {
            id: Uuid::new_v4(),
            course_id,
            section_id: section.id,
            title: title.to_string(),
            slug,
            description: req.description,
            lesson_type: req.lesson_type,
            content: req.content,
            video_url: req.video_url,
            duration_seconds: req.duration_seconds,
            sort_order: self.store.next_lesson_sort_order(section.id).await?,
            is_published: req.is_published.unwrap_or(true),
            is_free: req.is_free,
            created_at: now,
            updated_at: now,
        };

        let lesson = match self.store.insert_lesson(lesson).await {
            Ok(lesson) => lesson,
            Err(e) if e.violates(LESSON_SLUG_UNIQUE) => {
                return Err(LearnError::Validation(
                    "a lesson with this title already exists in the course".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        self.store.refresh_course_totals(course_id, now).await?;
        Ok(lesson)
    }

    pub async fn delete_lesson(&self, actor: &User, lesson_id: Uuid) -> Result<(), LearnError> {
        let lesson = self
            .store
            .get_lesson(lesson_id)
            .await?
            .ok_or_else(|| LearnError::not_found("lesson", lesson_id))?;
        let course = self.course(lesson.course_id).await?;
        require_owner(actor, course.instructor_id, Capability::EditCourses)?;

        if !self.store.delete_lesson(lesson_id).await? {
            return Err(LearnError::not_found("lesson", lesson_id));
        }
        self.store.refresh_course_totals(course.id, Utc::now()).await?;
        Ok(())
    }

    // ----- Listings -----

    pub async fn list_published(&self, query: CourseQuery, now: DateTime<Utc>) -> Result<CoursePage, LearnError> {
        let per_page = query
            .per_page
            .unwrap_or(self.courses_per_page)
            .clamp(1, MAX_PER_PAGE);
        let page = query.page.unwrap_or(1).max(1);
        let offset = (page - 1)
            .checked_mul(per_page)
            .ok_or_else(|| LearnError::Validation(format!("page {page} is out of range")))?;

        let listing = CourseListing {
            search: query
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            category_id: query.category,
            level: query.level,
            price_type: query.price_type,
            sort: query.sort.unwrap_or_default(),
            limit: per_page,
            offset,
            ..CourseListing::default()
        };
        let (items, total) = self.store.list_published_courses(listing, now).await?;

        Ok(CoursePage {
            items,
            total,
            page,
            per_page,
            total_pages: total_pages(total, per_page),
        })
    }

    pub async fn featured(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Course>, LearnError> {
        let listing = CourseListing {
            featured_only: true,
            limit,
            ..CourseListing::default()
        };
        Ok(self.store.list_published_courses(listing, now).await?.0)
    }

    pub async fn popular(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Course>, LearnError> {
        let listing = CourseListing {
            sort: CourseSort::Popular,
            limit,
            ..CourseListing::default()
        };
        Ok(self.store.list_published_courses(listing, now).await?.0)
    }

    /// Unpublished courses are only visible to their instructor and admins.
    pub async fn course_detail(
        &self,
        course_id: Uuid,
        viewer: Option<&User>,
        now: DateTime<Utc>,
    ) -> Result<CourseDetail, LearnError> {
        let course = self.course(course_id).await?;
        let privileged = viewer.is_some_and(|v| v.role == Role::Admin || v.id == course.instructor_id);
        if !course.is_published(now) && !privileged {
            return Err(LearnError::not_found("course", course_id));
        }

        let mut lessons_by_section: HashMap<Uuid, Vec<Lesson>> = HashMap::new();
        for lesson in self.store.list_lessons(course_id).await? {
            if lesson.is_published || privileged {
                lessons_by_section.entry(lesson.section_id).or_default().push(lesson);
            }
        }
        let sections = self
            .store
            .list_sections(course_id)
            .await?
            .into_iter()
            .map(|section| SectionWithLessons {
                lessons: lessons_by_section.remove(&section.id).unwrap_or_default(),
                section,
            })
            .collect();

        let ratings = self.store.list_published_ratings(course_id, DETAIL_RATINGS).await?;
        let enrollment = match viewer {
            Some(viewer) => self.store.find_enrollment(viewer.id, course_id).await?,
            None => None,
        };
        let similar_listing = CourseListing {
            category_id: Some(course.category_id),
            exclude_course: Some(course.id),
            limit: SIMILAR_COURSES,
            ..CourseListing::default()
        };
        let similar = self.store.list_published_courses(similar_listing, now).await?.0;

        Ok(CourseDetail {
            course,
            sections,
            ratings,
            enrollment,
            similar,
        })
    }

    pub async fn platform_stats(&self, now: DateTime<Utc>) -> Result<PlatformStats, LearnError> {
        let totals = self.store.published_catalog_totals(now).await?;
        Ok(PlatformStats {
            total_courses: totals.published_courses,
            total_students: self.store.count_users_by_role(Role::Student).await?,
            total_instructors: self.store.count_users_by_role(Role::Instructor).await?,
            total_hours: totals.published_minutes / 60,
        })
    }
}
