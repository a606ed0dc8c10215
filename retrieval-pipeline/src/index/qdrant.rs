use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use common::{error::AppError, utils::config::AppConfig};
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, value::Kind, Fusion, GetPointsBuilder, PointId,
        PrefetchQueryBuilder, Query, QueryPointsBuilder, Value, VectorInput,
    },
    Qdrant,
};
use serde_json::{Map, Number};
use tracing::{debug, instrument};

use super::{DocumentIndex, HybridQuery, RawHit};
use crate::pool::ResourcePool;

/// Qdrant collection with one named dense and one named sparse vector per point.
pub struct QdrantIndex {
    pool: ResourcePool<Qdrant>,
    collection: String,
    dense_vector: String,
    sparse_vector: String,
    request_timeout: Duration,
}

impl QdrantIndex {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let clients = (0..config.qdrant_pool_size.max(1))
            .map(|_| {
                Qdrant::from_url(&config.qdrant_url)
                    .api_key(config.qdrant_api_key.clone())
                    .timeout(request_timeout)
                    .build()
                    .map_err(|e| AppError::Qdrant(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            pool: ResourcePool::new(
                "qdrant",
                clients,
                Duration::from_secs(config.pool_checkout_timeout_secs),
            )?,
            collection: config.qdrant_collection.clone(),
            dense_vector: config.qdrant_dense_vector.clone(),
            sparse_vector: config.qdrant_sparse_vector.clone(),
            request_timeout,
        })
    }
}

#[async_trait]
impl DocumentIndex for QdrantIndex {
    #[instrument(skip_all, fields(collection = %self.collection))]
    async fn query_hybrid(&self, query: &HybridQuery) -> Result<Vec<RawHit>, AppError> {
        let sparse_prefetch = PrefetchQueryBuilder::default()
            .query(Query::new_nearest(VectorInput::new_sparse(
                query.sparse.indices.clone(),
                query.sparse.values.clone(),
            )))
            .using(self.sparse_vector.as_str())
            .limit(query.sparse_limit);
        let dense_prefetch = PrefetchQueryBuilder::default()
            .query(Query::new_nearest(VectorInput::new_dense(query.dense.clone())))
            .using(self.dense_vector.as_str())
            .limit(query.dense_limit);

        let request = QueryPointsBuilder::new(self.collection.clone())
            .add_prefetch(sparse_prefetch)
            .add_prefetch(dense_prefetch)
            .query(Fusion::Rrf)
            .limit(query.fusion_limit)
            .with_payload(true);

        let client = self.pool.checkout().await?;
        let response = tokio::time::timeout(self.request_timeout, client.query(request))
            .await?
            .map_err(|e| AppError::Qdrant(e.to_string()))?;
        drop(client);

        let hits: Vec<RawHit> = response
            .result
            .into_iter()
            .filter_map(|point| {
                Some(RawHit {
                    id: point_id_to_string(point.id?)?,
                    score: point.score,
                    payload: payload_to_json(point.payload),
                })
            })
            .collect();
        debug!(hits = hits.len(), "hybrid query finished");
        Ok(hits)
    }

    async fn retrieve_by_ids(&self, ids: &[String]) -> Result<Vec<RawHit>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let point_ids: Vec<PointId> = ids.iter().map(|id| string_to_point_id(id)).collect();
        let request = GetPointsBuilder::new(self.collection.clone(), point_ids).with_payload(true);

        let client = self.pool.checkout().await?;
        let response = tokio::time::timeout(self.request_timeout, client.get_points(request))
            .await?
            .map_err(|e| AppError::Qdrant(e.to_string()))?;
        drop(client);

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                Some(RawHit {
                    id: point_id_to_string(point.id?)?,
                    score: 0.0,
                    payload: payload_to_json(point.payload),
                })
            })
            .collect())
    }

    fn available_connections(&self) -> usize {
        self.pool.available()
    }
}

fn string_to_point_id(id: &str) -> PointId {
    id.parse::<u64>()
        .map_or_else(|_| PointId::from(id.to_string()), PointId::from)
}

fn point_id_to_string(id: PointId) -> Option<String> {
    match id.point_id_options? {
        PointIdOptions::Num(num) => Some(num.to_string()),
        PointIdOptions::Uuid(uuid) => Some(uuid),
    }
}

fn payload_to_json(payload: HashMap<String, Value>) -> serde_json::Value {
    serde_json::Value::Object(
        payload
            .into_iter()
            .map(|(key, value)| (key, value_to_json(value)))
            .collect(),
    )
}

fn value_to_json(value: Value) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => {
            Number::from_f64(d).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(object)) => serde_json::Value::Object(
            object
                .fields
                .into_iter()
                .map(|(key, value)| (key, value_to_json(value)))
                .collect::<Map<String, serde_json::Value>>(),
        ),
    }
}
