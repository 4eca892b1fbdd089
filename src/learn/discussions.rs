use chrono::Utc;
use log::debug;
use std::sync::Arc;
use uuid::Uuid;

use super::error::LearnError;
use super::store::LearnStore;
use super::types::*;

pub struct DiscussionBoard<S> {
    store: Arc<S>,
    max_reply_depth: i32,
}

impl<S> Clone for DiscussionBoard<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            max_reply_depth: self.max_reply_depth,
        }
    }
}

impl<S: LearnStore> DiscussionBoard<S> {
    pub fn new(store: Arc<S>, max_reply_depth: i32) -> Self {
        Self {
            store,
            max_reply_depth,
        }
    }

    pub async fn start_discussion(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        req: StartDiscussionRequest,
    ) -> Result<Discussion, LearnError> {
        let title = req.title.trim();
        let content = req.content.trim();
        if title.is_empty() || content.is_empty() {
            return Err(LearnError::Validation(
                "title and content are required".to_string(),
            ));
        }

        if self.store.get_course(course_id).await?.is_none() {
            return Err(LearnError::not_found("course", course_id));
        }
        if let Some(lesson_id) = req.lesson_id {
            let belongs = self
                .store
                .get_lesson(lesson_id)
                .await?
                .is_some_and(|lesson| lesson.course_id == course_id);
            if !belongs {
                return Err(LearnError::Validation(format!(
                    "lesson {lesson_id} is not part of course {course_id}"
                )));
            }
        }

        let now = Utc::now();
        let discussion = Discussion {
            id: Uuid::new_v4(),
            course_id,
            lesson_id: req.lesson_id,
            user_id,
            title: title.to_string(),
            content: content.to_string(),
            is_pinned: false,
            is_resolved: false,
            replies_count: 0,
            likes_count: 0,
            last_activity_at: now,
            created_at: now,
        };
        Ok(self.store.insert_discussion(discussion).await?)
    }

    pub async fn post_reply(
        &self,
        discussion_id: Uuid,
        user_id: Uuid,
        req: PostReplyRequest,
    ) -> Result<ReplyPosted, LearnError> {
        let content = req.content.trim();
        if content.is_empty() {
            return Err(LearnError::Validation("content is required".to_string()));
        }

        if self.store.get_discussion(discussion_id).await?.is_none() {
            return Err(LearnError::not_found("discussion", discussion_id));
        }

        let depth = match req.parent_id {
            None => 0,
            Some(parent_id) => {
                let parent = self
                    .store
                    .get_reply(parent_id)
                    .await?
                    .filter(|parent| parent.discussion_id == discussion_id)
                    .ok_or_else(|| {
                        LearnError::InvalidParent(format!(
                            "reply {parent_id} does not belong to discussion {discussion_id}"
                        ))
                    })?;
                let depth = parent.depth + 1;
                if depth > self.max_reply_depth {
                    return Err(LearnError::InvalidParent(format!(
                        "replies cannot be nested deeper than {} levels",
                        self.max_reply_depth
                    )));
                }
                depth
            }
        };

        let now = Utc::now();
        let reply = self
            .store
            .insert_reply(DiscussionReply {
                id: Uuid::new_v4(),
                discussion_id,
                user_id,
                parent_id: req.parent_id,
                depth,
                content: content.to_string(),
                likes_count: 0,
                is_solution: false,
                created_at: now,
            })
            .await?;
        let discussion = self.store.bump_discussion_activity(discussion_id, now).await?;
        debug!(
            "Reply {} posted to discussion {discussion_id} ({} replies)",
            reply.id, discussion.replies_count
        );

        Ok(ReplyPosted { reply, discussion })
    }

    pub async fn mark_solution(
        &self,
        actor: &User,
        discussion_id: Uuid,
        reply_id: Uuid,
    ) -> Result<Discussion, LearnError> {
        let discussion = self
            .store
            .get_discussion(discussion_id)
            .await?
            .ok_or_else(|| LearnError::not_found("discussion", discussion_id))?;
        if discussion.user_id != actor.id && actor.role != Role::Admin {
            return Err(LearnError::Forbidden(
                "only the author can accept a solution".to_string(),
            ));
        }

        let belongs = self
            .store
            .get_reply(reply_id)
            .await?
            .is_some_and(|reply| reply.discussion_id == discussion_id);
        if !belongs {
            return Err(LearnError::InvalidParent(format!(
                "reply {reply_id} does not belong to discussion {discussion_id}"
            )));
        }

        Ok(self.store.mark_solution(discussion_id, reply_id).await?)
    }

    pub async fn list_discussions(&self, course_id: Uuid) -> Result<Vec<Discussion>, LearnError> {
        Ok(self.store.list_discussions(course_id).await?)
    }

    pub async fn list_replies(&self, discussion_id: Uuid) -> Result<Vec<DiscussionReply>, LearnError> {
        if self.store.get_discussion(discussion_id).await?.is_none() {
            return Err(LearnError::not_found("discussion", discussion_id));
        }
        Ok(self.store.list_replies(discussion_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::TestPlatform;

    fn topic() -> StartDiscussionRequest {
        StartDiscussionRequest {
            lesson_id: None,
            title: "Borrow checker question".to_string(),
            content: "Why does this closure need move?".to_string(),
        }
    }

    fn reply(parent_id: Option<Uuid>) -> PostReplyRequest {
        PostReplyRequest {
            content: "Because it outlives the stack frame.".to_string(),
            parent_id,
        }
    }

    #[tokio::test]
    async fn test_replies_update_counters() {
        let platform = TestPlatform::new();
        let student = platform.student().await;
        let (course, _) = platform.free_course(1).await;
        let board = &platform.learn.discussions;

        let discussion = board.start_discussion(student.id, course.id, topic()).await.unwrap();
        assert_eq!(discussion.replies_count, 0);

        let first = board.post_reply(discussion.id, student.id, reply(None)).await.unwrap();
        let nested = board
            .post_reply(discussion.id, student.id, reply(Some(first.reply.id)))
            .await
            .unwrap();
        assert_eq!(nested.reply.depth, 1);
        assert_eq!(nested.discussion.replies_count, 2);
        assert!(nested.discussion.last_activity_at >= discussion.last_activity_at);

        let replies = board.list_replies(discussion.id).await.unwrap();
        assert_eq!(replies.len() as i32, nested.discussion.replies_count);
    }

    #[tokio::test]
    async fn test_parent_from_other_discussion_rejected() {
        let platform = TestPlatform::new();
        let student = platform.student().await;
        let (course, _) = platform.free_course(1).await;
        let board = &platform.learn.discussions;

        let first = board.start_discussion(student.id, course.id, topic()).await.unwrap();
        let second = board.start_discussion(student.id, course.id, topic()).await.unwrap();
        let foreign = board.post_reply(first.id, student.id, reply(None)).await.unwrap();

        let err = board
            .post_reply(second.id, student.id, reply(Some(foreign.reply.id)))
            .await
            .unwrap_err();
        assert!(matches!(err, LearnError::InvalidParent(_)));

        let err = board
            .post_reply(second.id, student.id, reply(Some(Uuid::new_v4())))
            .await
            .unwrap_err();
        assert!(matches!(err, LearnError::InvalidParent(_)));

        let second = platform.store.get_discussion(second.id).await.unwrap().unwrap();
        assert_eq!(second.replies_count, 0);
    }

    #[tokio::test]
    async fn test_reply_depth_is_bounded() {
        let platform = TestPlatform::new();
        let student = platform.student().await;
        let (course, _) = platform.free_course(1).await;
        let board = DiscussionBoard::new(platform.store.clone(), 2);

        let discussion = board.start_discussion(student.id, course.id, topic()).await.unwrap();
        let mut parent = None;
        for _ in 0..3 {
            let posted = board.post_reply(discussion.id, student.id, reply(parent)).await.unwrap();
            parent = Some(posted.reply.id);
        }
        let err = board
            .post_reply(discussion.id, student.id, reply(parent))
            .await
            .unwrap_err();
        assert!(matches!(err, LearnError::InvalidParent(_)));
    }

    #[tokio::test]
    async fn test_start_discussion_validates_lesson() {
        let platform = TestPlatform::new();
        let student = platform.student().await;
        let (course, _) = platform.free_course(1).await;
        let (_, other_lessons) = platform.free_course(1).await;

        let mut req = topic();
        req.lesson_id = Some(other_lessons[0].id);
        let err = platform
            .learn
            .discussions
            .start_discussion(student.id, course.id, req)
            .await
            .unwrap_err();
        assert!(matches!(err, LearnError::Validation(_)));

        let err = platform
            .learn
            .discussions
            .post_reply(Uuid::new_v4(), student.id, reply(None))
            .await
            .unwrap_err();
        assert!(matches!(err, LearnError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_only_author_marks_solution() {
        let platform = TestPlatform::new();
        let author = platform.student().await;
        let helper = platform.student().await;
        let (course, _) = platform.free_course(1).await;
        let board = &platform.learn.discussions;

        let discussion = board.start_discussion(author.id, course.id, topic()).await.unwrap();
        let answer = board.post_reply(discussion.id, helper.id, reply(None)).await.unwrap();

        let err = board
            .mark_solution(&helper, discussion.id, answer.reply.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LearnError::Forbidden(_)));

        let resolved = board
            .mark_solution(&author, discussion.id, answer.reply.id)
            .await
            .unwrap();
        assert!(resolved.is_resolved);
        let stored = platform.store.get_reply(answer.reply.id).await.unwrap().unwrap();
        assert!(stored.is_solution);
    }
}
