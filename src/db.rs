// Writes that touch more than one row go through a transaction, so that an import either lands
// completely or not at all. Metadata write-back is the exception: each record is its own update,
// a missing row only means that record is skipped, and a failed update is recorded before moving
// on to the next record.

use crate::{
    Result,
    models::{MetadataRecord, UpdateFailure, VideoBackup, WatchRecord, WatchRows},
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{PgPool, postgres::PgPoolOptions, types::Json};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateSummary {
    pub updated: usize,
    /// Records without a matching row
    pub skipped: usize,
    /// Records the DB refused
    pub errors: Vec<UpdateFailure>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportCounts {
    /// New rows in videos
    pub videos: u64,
    pub watches: u64,
}

/// Where video ids come from and metadata goes to
pub trait Store {
    /// Ids never updated, or updated before stale_before. Never updated first, then oldest first.
    async fn videos_needing_update(
        &self,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>>;

    async fn update_metadata(&self, records: &[MetadataRecord]) -> Result<UpdateSummary>;

    async fn import_watches(&self, rows: WatchRows) -> Result<ImportCounts>;

    /// Every video with all its columns and watches, ordered by video_id
    async fn export(&self) -> Result<Vec<VideoBackup>>;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

fn to_i64(v: Option<u64>) -> Option<i64> {
    v.and_then(|v| i64::try_from(v).ok())
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32, timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect(url)
            .await?;
        debug!("Connected to DB");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        trace!("DB pool closed");
    }
}

impl Store for PgStore {
    async fn videos_needing_update(
        &self,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
                select video_id from videos
                where metadata_updated_at is null or metadata_updated_at < $1
                order by metadata_updated_at asc nulls first
                limit $2
            "#,
        )
        .bind(stale_before)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        trace!(count = ids.len(), %stale_before, "Selected stale videos");
        Ok(ids)
    }

    async fn update_metadata(&self, records: &[MetadataRecord]) -> Result<UpdateSummary> {
        let start = Instant::now();
        let mut sum = UpdateSummary::default();

        for r in records {
            let res = sqlx::query(
                r#"
                    update videos set
                        title = $2, description = $3, thumbnail_url = $4, tags = $5,
                        category_id = $6, audio_language = $7, duration = $8,
                        duration_seconds = $9, licensed_content = $10, channel_id = $11,
                        channel_title = $12, published_at = $13, view_count = $14,
                        like_count = $15, comment_count = $16, privacy_status = $17,
                        license = $18, embeddable = $19, topic_categories = $20,
                        recording_date = $21, recording_location = $22, was_livestream = $23,
                        actual_start_time = $24, actual_end_time = $25,
                        has_paid_product_placement = $26, metadata_updated_at = $27
                    where video_id = $1
                "#,
            )
            .bind(&r.video_id)
            .bind(&r.title)
            .bind(&r.description)
            .bind(&r.thumbnail_url)
            .bind(&r.tags)
            .bind(&r.category_id)
            .bind(&r.audio_language)
            .bind(&r.duration)
            .bind(to_i64(r.duration_seconds))
            .bind(r.licensed_content)
            .bind(&r.channel_id)
            .bind(&r.channel_title)
            .bind(r.published_at)
            .bind(to_i64(r.view_count))
            .bind(to_i64(r.like_count))
            .bind(to_i64(r.comment_count))
            .bind(&r.privacy_status)
            .bind(&r.license)
            .bind(r.embeddable)
            .bind(&r.topic_categories)
            .bind(r.recording_date)
            .bind(&r.recording_location)
            .bind(r.was_livestream)
            .bind(r.actual_start_time)
            .bind(r.actual_end_time)
            .bind(r.has_paid_product_placement)
            .bind(r.metadata_updated_at)
            .execute(&self.pool)
            .await;

            match res {
                Ok(res) if res.rows_affected() == 0 => {
                    debug!(video_id = %r.video_id, "No row for video, skipping");
                    sum.skipped += 1;
                }
                Ok(_) => sum.updated += 1,
                Err(err) => {
                    warn!(video_id = %r.video_id, %err, "Failed to update video");
                    sum.errors.push(UpdateFailure {
                        video_id: r.video_id.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        trace!(?sum, "Metadata write-back done in {:?}", start.elapsed());
        Ok(sum)
    }

    async fn import_watches(&self, rows: WatchRows) -> Result<ImportCounts> {
        trace!(
            "Adding {} videos and {} watches to DB",
            rows.num_videos(),
            rows.num_watches()
        );
        let start = Instant::now();

        let mut tx = self.pool.begin().await?;

        // existing videos keep whatever they have, including refreshed metadata
        let videos = sqlx::query(
            r#"
                insert into videos (video_id, title, channel_id, channel_title)
                select * from unnest($1::text[], $2::text[], $3::text[], $4::text[])
                on conflict (video_id) do nothing
            "#,
        )
        .bind(&rows.video_ids)
        .bind(&rows.titles)
        .bind(&rows.channel_ids)
        .bind(&rows.channel_titles)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let watches = sqlx::query(
            r#"
                insert into watch_history (watch_id, video_id, watched_at)
                select * from unnest($1::uuid[], $2::text[], $3::timestamptz[])
            "#,
        )
        .bind(&rows.watch_ids)
        .bind(&rows.watch_video_ids)
        .bind(&rows.watched_ats)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        trace!("DB import done in {:?}", start.elapsed());

        Ok(ImportCounts { videos, watches })
    }

    async fn export(&self) -> Result<Vec<VideoBackup>> {
        let start = Instant::now();
        let rows = sqlx::query_as::<_, (String, Json<Map<String, Value>>, Json<Vec<WatchRecord>>)>(
            r#"
                select
                    v.video_id,
                    to_jsonb(v) - 'video_id',
                    coalesce(
                        (
                            select jsonb_agg(
                                jsonb_build_object('watch_id', w.watch_id, 'watched_at', w.watched_at)
                                order by w.watched_at
                            )
                            from watch_history w
                            where w.video_id = v.video_id
                        ),
                        '[]'::jsonb
                    )
                from videos v
                order by v.video_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        trace!(videos = rows.len(), "DB export done in {:?}", start.elapsed());

        Ok(rows
            .into_iter()
            .map(|(video_id, columns, watches)| VideoBackup {
                video_id,
                columns: columns.0,
                watches: watches.0,
            })
            .collect())
    }
}
