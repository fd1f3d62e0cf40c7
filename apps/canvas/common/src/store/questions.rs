use super::session_data::{insert_row, live_rows};
use super::{CanvasStore, OwnedChange};
use crate::{ServiceError, SessionDataType};
use chrono::{DateTime, Utc};
use entity::session_data;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

/// JSON body of a `Question` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub question_id: Uuid,
    pub text: String,
    pub user_name: String,
    pub user_id: String,
    pub submitted_at: DateTime<Utc>,
    pub votes: i64,
    pub is_answered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "up" => Some(VoteDirection::Up),
            "down" => Some(VoteDirection::Down),
            _ => None,
        }
    }

    fn delta(&self) -> i64 {
        match self {
            VoteDirection::Up => 1,
            VoteDirection::Down => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VoteOutcome {
    Counted(QuestionRecord),
    AlreadyVoted,
    QuestionNotFound,
}

fn parse_question(row: &session_data::Model) -> Option<QuestionRecord> {
    match serde_json::from_value(row.content.clone()) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Skipping malformed question row {}: {}", row.data_id, e);
            None
        }
    }
}

async fn question_in<C: ConnectionTrait>(
    db: &C,
    session_id: i64,
    question_id: Uuid,
) -> Result<Option<(session_data::Model, QuestionRecord)>, DbErr> {
    Ok(live_rows(session_id, SessionDataType::Question)
        .all(db)
        .await?
        .into_iter()
        .find_map(|row| {
            let record = parse_question(&row)?;
            (record.question_id == question_id).then_some((row, record))
        }))
}

/// Re-reads the question row under `FOR UPDATE` so writers to one question
/// run one after another. SQLite serializes writers on its own.
async fn lock_question(
    txn: &DatabaseTransaction,
    session_id: i64,
    question_id: Uuid,
) -> Result<Option<(session_data::Model, QuestionRecord)>, DbErr> {
    let Some((row, _)) = question_in(txn, session_id, question_id).await? else {
        return Ok(None);
    };
    let locked = session_data::Entity::find_by_id(row.data_id)
        .filter(session_data::Column::IsDeleted.eq(false))
        .lock_exclusive()
        .one(txn)
        .await?;
    Ok(locked.and_then(|row| {
        let record = parse_question(&row)?;
        Some((row, record))
    }))
}

fn tally(votes: &[session_data::Model]) -> i64 {
    votes
        .iter()
        .filter_map(|vote| vote.content["direction"].as_str().and_then(VoteDirection::parse))
        .map(|direction| direction.delta())
        .sum()
}

async fn write_content<C: ConnectionTrait>(
    db: &C,
    existing: session_data::Model,
    content: serde_json::Value,
) -> Result<session_data::Model, DbErr> {
    let mut active: session_data::ActiveModel = existing.into();
    active.content = Set(content);
    active.update(db).await
}

impl CanvasStore {
    pub async fn submit_question(
        &self,
        session_id: i64,
        user_guid: &str,
        user_name: &str,
        text: &str,
    ) -> Result<QuestionRecord, ServiceError> {
        let record = QuestionRecord {
            question_id: Uuid::new_v4(),
            text: text.trim().to_string(),
            user_name: user_name.to_string(),
            user_id: user_guid.to_string(),
            submitted_at: Utc::now(),
            votes: 0,
            is_answered: false,
            answer_text: None,
        };
        self.insert_data(
            session_id,
            SessionDataType::Question,
            serde_json::to_value(&record)?,
            Some(user_guid),
        )
        .await?;
        Ok(record)
    }

    /// Questions in submission order.
    pub async fn questions_for_session(
        &self,
        session_id: i64,
    ) -> Result<Vec<QuestionRecord>, ServiceError> {
        Ok(self
            .data_of_type(session_id, SessionDataType::Question)
            .await?
            .iter()
            .filter_map(parse_question)
            .collect())
    }

    async fn find_question_row(
        &self,
        session_id: i64,
        question_id: Uuid,
    ) -> Result<Option<(session_data::Model, QuestionRecord)>, ServiceError> {
        Ok(question_in(&self.db, session_id, question_id).await?)
    }

    pub async fn find_question(
        &self,
        session_id: i64,
        question_id: Uuid,
    ) -> Result<Option<QuestionRecord>, ServiceError> {
        Ok(self
            .find_question_row(session_id, question_id)
            .await?
            .map(|(_, record)| record))
    }

    /// Applies one vote per user per question. The tally is recomputed from
    /// the vote rows while the question row is locked.
    pub async fn record_vote(
        &self,
        session_id: i64,
        question_id: Uuid,
        user_guid: &str,
        direction: VoteDirection,
    ) -> Result<VoteOutcome, ServiceError> {
        let txn = self.db.begin().await?;
        let Some((row, mut record)) = lock_question(&txn, session_id, question_id).await? else {
            return Ok(VoteOutcome::QuestionNotFound);
        };

        let question_key = question_id.to_string();
        let mut votes: Vec<session_data::Model> = live_rows(session_id, SessionDataType::QuestionVote)
            .all(&txn)
            .await?
            .into_iter()
            .filter(|vote| vote.content["questionId"].as_str() == Some(question_key.as_str()))
            .collect();
        if votes.iter().any(|vote| vote.created_by.as_deref() == Some(user_guid)) {
            return Ok(VoteOutcome::AlreadyVoted);
        }

        let vote = insert_row(
            &txn,
            session_id,
            SessionDataType::QuestionVote,
            json!({
                "questionId": question_key,
                "userGuid": user_guid,
                "direction": direction,
                "votedAt": Utc::now(),
            }),
            Some(user_guid),
        )
        .await?;
        votes.push(vote);

        record.votes = tally(&votes);
        write_content(&txn, row, serde_json::to_value(&record)?).await?;
        txn.commit().await?;
        Ok(VoteOutcome::Counted(record))
    }

    pub async fn delete_question(
        &self,
        session_id: i64,
        question_id: Uuid,
        user_guid: &str,
    ) -> Result<OwnedChange, ServiceError> {
        let Some((row, _)) = self.find_question_row(session_id, question_id).await? else {
            return Ok(OwnedChange::NotFound);
        };
        self.remove_owned_data(row.data_id, SessionDataType::Question, user_guid)
            .await
    }

    /// Flags the question answered and keeps the answer text as its own row.
    pub async fn answer_question(
        &self,
        session_id: i64,
        question_id: Uuid,
        answered_by: &str,
        answer_text: Option<String>,
    ) -> Result<Option<QuestionRecord>, ServiceError> {
        let txn = self.db.begin().await?;
        let Some((row, mut record)) = lock_question(&txn, session_id, question_id).await? else {
            return Ok(None);
        };

        if let Some(text) = &answer_text {
            insert_row(
                &txn,
                session_id,
                SessionDataType::QuestionAnswer,
                json!({
                    "questionId": question_id,
                    "answerText": text,
                    "answeredBy": answered_by,
                    "answeredAt": Utc::now(),
                }),
                Some(answered_by),
            )
            .await?;
        }

        record.is_answered = true;
        record.answer_text = answer_text;
        write_content(&txn, row, serde_json::to_value(&record)?).await?;
        txn.commit().await?;
        Ok(Some(record))
    }
}
