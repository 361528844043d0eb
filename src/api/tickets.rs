use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
};
use serde::Serialize;

use crate::AppState;
use crate::error::{ResolverError, Result};
use crate::tickets::{Ticket, TicketFilter, TicketId, TicketStatus, TicketUpdate};

/// GET /api/tickets - List tickets in insertion order.
pub async fn list_tickets(
    State(state): State<AppState>,
    filter: std::result::Result<Query<TicketFilter>, QueryRejection>,
) -> Result<Json<Vec<Ticket>>> {
    let Query(filter) = filter?;
    Ok(Json(state.service.store().list(&filter)))
}

/// GET /api/tickets/{id}
pub async fn get_ticket(
    State(state): State<AppState>,
    id: std::result::Result<Path<TicketId>, PathRejection>,
) -> Result<Json<Ticket>> {
    let Path(id) = id?;
    Ok(Json(state.service.store().get(id)?))
}

/// PATCH /api/tickets/{id} - Manual edit of a stored ticket.
pub async fn update_ticket(
    State(state): State<AppState>,
    id: std::result::Result<Path<TicketId>, PathRejection>,
    body: std::result::Result<Json<TicketUpdate>, JsonRejection>,
) -> Result<Json<Ticket>> {
    let Path(id) = id?;
    let Json(update) = body?;
    if update
        .description
        .as_deref()
        .is_some_and(|d| d.trim().is_empty())
    {
        return Err(ResolverError::InvalidInput(
            "description cannot be empty".to_string(),
        ));
    }
    let ticket = state.service.store().update(id, update)?;
    tracing::info!(ticket_id = %id, status = ?ticket.status, "Ticket updated");
    Ok(Json(ticket))
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketStats {
    total_tickets: usize,
    resolved: usize,
    pending: usize,
    in_progress: usize,
    new: usize,
    historical: usize,
}

impl TicketStats {
    fn collect(tickets: &[Ticket]) -> Self {
        tickets.iter().fold(
            Self {
                total_tickets: tickets.len(),
                ..Self::default()
            },
            |mut stats, ticket| {
                match ticket.status {
                    TicketStatus::Resolved => stats.resolved += 1,
                    TicketStatus::Pending => stats.pending += 1,
                    TicketStatus::InProgress => stats.in_progress += 1,
                    TicketStatus::New => stats.new += 1,
                }
                if ticket.is_historical() {
                    stats.historical += 1;
                }
                stats
            },
        )
    }
}

/// GET /api/stats - Ticket counts by status.
pub async fn ticket_stats(State(state): State<AppState>) -> Json<TicketStats> {
    let tickets = state.service.store().list(&TicketFilter::default());
    Json(TicketStats::collect(&tickets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::Priority;

    #[test]
    fn test_stats_counts_by_status() {
        let mut pending = Ticket::submitted("b", Priority::Low);
        pending.status = TicketStatus::Pending;
        let tickets = vec![
            Ticket::imported("a", "fix", Priority::Low),
            pending,
            Ticket::submitted("c", Priority::High),
        ];

        assert_eq!(
            TicketStats::collect(&tickets),
            TicketStats {
                total_tickets: 3,
                resolved: 1,
                pending: 1,
                in_progress: 0,
                new: 1,
                historical: 1,
            }
        );
    }
}
