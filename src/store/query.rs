//! Predicate builder for querying charge requests.

use crate::domain::{ChargeMode, RequestStatus};

/// Constraint on a request's pile assignment
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PileFilter {
    #[default]
    Any,
    /// In the holding area
    Unassigned,
    /// On any pile
    Assigned,
    /// On this pile
    At(String),
}

/// Result ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    /// Oldest first; ties in creation order
    #[default]
    Created,
    /// Queue position, then creation
    QueuePosition,
}

/// A query over the requests table.
///
/// ```ignore
/// let oldest = RequestQuery::status(RequestStatus::Waiting)
///     .unassigned()
///     .mode(ChargeMode::Fast)
///     .limit(3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestQuery {
    pub statuses: Vec<RequestStatus>,
    pub pile: PileFilter,
    pub mode: Option<ChargeMode>,
    pub user_id: Option<String>,
    pub order: Order,
    pub limit: Option<usize>,
}

impl RequestQuery {
    /// Match every request
    pub fn all() -> Self {
        Self::default()
    }

    /// Match requests in the given status
    pub fn status(status: RequestStatus) -> Self {
        Self::statuses(&[status])
    }

    /// Match requests in any of the given statuses
    pub fn statuses(statuses: &[RequestStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Self::default()
        }
    }

    /// Match active requests (waiting, priority waiting or charging)
    pub fn active() -> Self {
        Self::statuses(&RequestStatus::ACTIVE)
    }

    pub fn unassigned(mut self) -> Self {
        self.pile = PileFilter::Unassigned;
        self
    }

    pub fn assigned(mut self) -> Self {
        self.pile = PileFilter::Assigned;
        self
    }

    pub fn at_pile(mut self, pile_id: &str) -> Self {
        self.pile = PileFilter::At(pile_id.to_string());
        self.order = Order::QueuePosition;
        self
    }

    pub fn mode(mut self, mode: ChargeMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Render the WHERE/ORDER/LIMIT clauses with positional parameters
    pub(crate) fn to_sql(&self, select: &str) -> (String, Vec<String>) {
        let mut sql = format!("{} FROM requests WHERE 1 = 1", select);
        let mut params: Vec<String> = Vec::new();

        if !self.statuses.is_empty() {
            let placeholders: Vec<String> = self
                .statuses
                .iter()
                .map(|s| {
                    params.push(s.as_str().to_string());
                    format!("?{}", params.len())
                })
                .collect();
            sql.push_str(&format!(" AND status IN ({})", placeholders.join(", ")));
        }

        match &self.pile {
            PileFilter::Any => {}
            PileFilter::Unassigned => sql.push_str(" AND pile_id IS NULL"),
            PileFilter::Assigned => sql.push_str(" AND pile_id IS NOT NULL"),
            PileFilter::At(pile_id) => {
                params.push(pile_id.clone());
                sql.push_str(&format!(" AND pile_id = ?{}", params.len()));
            }
        }

        if let Some(mode) = self.mode {
            params.push(mode.as_str().to_string());
            sql.push_str(&format!(" AND mode = ?{}", params.len()));
        }

        if let Some(user_id) = &self.user_id {
            params.push(user_id.clone());
            sql.push_str(&format!(" AND user_id = ?{}", params.len()));
        }

        match self.order {
            Order::Created => sql.push_str(" ORDER BY created_at, rowid"),
            Order::QueuePosition => sql.push_str(" ORDER BY queue_position, created_at, rowid"),
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        (sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_has_no_predicates() {
        let (sql, params) = RequestQuery::all().to_sql("SELECT json_data");
        assert_eq!(sql, "SELECT json_data FROM requests WHERE 1 = 1 ORDER BY created_at, rowid");
        assert!(params.is_empty());
    }

    #[test]
    fn test_status_and_holding_area() {
        let (sql, params) = RequestQuery::status(RequestStatus::Waiting)
            .unassigned()
            .mode(ChargeMode::Slow)
            .limit(3)
            .to_sql("SELECT json_data");
        assert!(sql.contains("status IN (?1)"));
        assert!(sql.contains("pile_id IS NULL"));
        assert!(sql.contains("mode = ?2"));
        assert!(sql.ends_with("LIMIT 3"));
        assert_eq!(params, vec!["WAITING".to_string(), "slow".to_string()]);
    }

    #[test]
    fn test_at_pile_orders_by_position() {
        let (sql, params) = RequestQuery::active().at_pile("F001").to_sql("SELECT COUNT(*)");
        assert!(sql.starts_with("SELECT COUNT(*) FROM requests"));
        assert!(sql.contains("status IN (?1, ?2, ?3)"));
        assert!(sql.contains("pile_id = ?4"));
        assert!(sql.contains("ORDER BY queue_position"));
        assert_eq!(params[3], "F001");
    }

    #[test]
    fn test_user_filter() {
        let (sql, params) = RequestQuery::active().user("alice").to_sql("SELECT json_data");
        assert!(sql.contains("user_id = ?4"));
        assert_eq!(params.last().map(String::as_str), Some("alice"));
    }
}
