//! Posting a confirmed transfer against staged stock.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use fleetstock_core::{DomainError, DomainResult, ItemId};

use crate::movement::MovementEntry;
use crate::stock::{StockBook, StockKey};
use crate::transfer::TransferRequest;

/// Validate and apply every line of a pending transfer to `book`.
///
/// The book must hold the currently stored source and destination records of
/// every line item (absent ones are simply not loaded). Lines are processed in
/// stored order, twice:
///
/// 1. validation: each line must be covered by what is left at the source after
///    the earlier lines; the first uncovered line aborts with
///    `InsufficientStock` naming its item, and the book is left untouched;
/// 2. application: a negative leg at the source and a positive leg at the
///    destination per line, opening the destination record when the pair has
///    never held stock. One movement entry per leg is returned, in order.
///
/// On error the caller must discard the book.
pub fn post_transfer(
    transfer: &TransferRequest,
    book: &mut StockBook,
    at: DateTime<Utc>,
) -> DomainResult<Vec<MovementEntry>> {
    if !transfer.is_pending() {
        return Err(DomainError::InvalidTransferState {
            transfer: transfer.id_typed().to_string(),
            actual: transfer.status().to_string(),
        });
    }
    let (source, destination) = transfer
        .route()
        .ok_or_else(|| DomainError::not_found("transfer", transfer.id_typed()))?;

    let mut committed: HashMap<ItemId, i64> = HashMap::new();
    for line in transfer.lines() {
        let key = StockKey::new(line.item_id, source);
        let available = book.quantity(&key);
        let already = committed.get(&line.item_id).copied().unwrap_or(0);
        let remaining = available.unwrap_or(0) - already;

        if available.is_none() || remaining < line.quantity {
            return Err(DomainError::InsufficientStock {
                item: line.item_id.to_string(),
                warehouse: source.to_string(),
                available: remaining.max(0),
                requested: line.quantity,
            });
        }
        committed.insert(line.item_id, already + line.quantity);
    }

    let transfer_id = Some(transfer.id_typed());
    let mut movements = Vec::with_capacity(transfer.lines().len() * 2);
    for line in transfer.lines() {
        let from = StockKey::new(line.item_id, source);
        let (record_id, change) = book.adjust(&from, -line.quantity, at)?;
        movements.push(MovementEntry::from_change(record_id, transfer_id, change, at)?);

        let to = StockKey::new(line.item_id, destination);
        if book.get(&to).is_none() {
            book.open(to, at)?;
        }
        let (record_id, change) = book.adjust(&to, line.quantity, at)?;
        movements.push(MovementEntry::from_change(record_id, transfer_id, change, at)?);
    }

    Ok(movements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetstock_core::{AggregateId, UserId, WarehouseId};
    use fleetstock_events::execute;

    use crate::stock::StockRecord;
    use crate::transfer::{
        ConfirmTransfer, CreateTransfer, RequestedLine, TransferCommand, TransferId,
    };

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn pending(source: WarehouseId, destination: WarehouseId, lines: Vec<RequestedLine>) -> TransferRequest {
        let id = TransferId::new(AggregateId::new());
        let mut transfer = TransferRequest::empty(id);
        execute(
            &mut transfer,
            &TransferCommand::CreateTransfer(CreateTransfer {
                transfer_id: id,
                source,
                destination,
                requested_by: UserId::new(),
                lines,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        transfer
    }

    #[test]
    fn posts_both_legs_and_opens_destination() {
        let (a, b, p) = (WarehouseId::new(), WarehouseId::new(), ItemId::new());
        let transfer = pending(a, b, vec![RequestedLine { item_id: p, quantity: 4 }]);

        let mut book = StockBook::new();
        book.load(StockRecord::assign(p, a, 10, test_time()).unwrap());

        let movements = post_transfer(&transfer, &mut book, test_time()).unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!((movements[0].quantity_before(), movements[0].quantity_after()), (10, 6));
        assert_eq!((movements[1].quantity_before(), movements[1].quantity_after()), (0, 4));
        assert_eq!(movements[0].transfer_id(), Some(transfer.id_typed()));

        assert_eq!(book.quantity(&StockKey::new(p, a)), Some(6));
        assert_eq!(book.quantity(&StockKey::new(p, b)), Some(4));
    }

    #[test]
    fn insufficient_source_leaves_book_untouched() {
        let (a, b, p) = (WarehouseId::new(), WarehouseId::new(), ItemId::new());
        let transfer = pending(a, b, vec![RequestedLine { item_id: p, quantity: 5 }]);

        let mut book = StockBook::new();
        book.load(StockRecord::assign(p, a, 2, test_time()).unwrap());

        let err = post_transfer(&transfer, &mut book, test_time()).unwrap_err();
        match err {
            DomainError::InsufficientStock { item, available, requested, .. } => {
                assert_eq!(item, p.to_string());
                assert_eq!(available, 2);
                assert_eq!(requested, 5);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert!(book.into_changed().is_empty());
    }

    #[test]
    fn missing_source_record_is_insufficient_stock() {
        let (a, b, p) = (WarehouseId::new(), WarehouseId::new(), ItemId::new());
        let transfer = pending(a, b, vec![RequestedLine { item_id: p, quantity: 1 }]);
        let mut book = StockBook::new();
        assert!(matches!(
            post_transfer(&transfer, &mut book, test_time()),
            Err(DomainError::InsufficientStock { .. })
        ));
    }

    #[test]
    fn later_line_failure_aborts_earlier_lines() {
        let (a, b) = (WarehouseId::new(), WarehouseId::new());
        let (p, q) = (ItemId::new(), ItemId::new());
        let transfer = pending(
            a,
            b,
            vec![
                RequestedLine { item_id: p, quantity: 1 },
                RequestedLine { item_id: q, quantity: 9 },
            ],
        );

        let mut book = StockBook::new();
        book.load(StockRecord::assign(p, a, 5, test_time()).unwrap());
        book.load(StockRecord::assign(q, a, 3, test_time()).unwrap());

        let err = post_transfer(&transfer, &mut book, test_time()).unwrap_err();
        match err {
            DomainError::InsufficientStock { item, .. } => assert_eq!(item, q.to_string()),
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(book.quantity(&StockKey::new(p, a)), Some(5));
    }

    #[test]
    fn repeated_item_lines_are_validated_cumulatively() {
        let (a, b, p) = (WarehouseId::new(), WarehouseId::new(), ItemId::new());
        let transfer = pending(
            a,
            b,
            vec![
                RequestedLine { item_id: p, quantity: 3 },
                RequestedLine { item_id: p, quantity: 3 },
            ],
        );

        let mut book = StockBook::new();
        book.load(StockRecord::assign(p, a, 5, test_time()).unwrap());

        assert!(matches!(
            post_transfer(&transfer, &mut book, test_time()),
            Err(DomainError::InsufficientStock { available: 2, requested: 3, .. })
        ));
    }

    #[test]
    fn confirmed_transfer_cannot_be_posted_again() {
        let (a, b, p) = (WarehouseId::new(), WarehouseId::new(), ItemId::new());
        let mut transfer = pending(a, b, vec![RequestedLine { item_id: p, quantity: 1 }]);
        let id = transfer.id_typed();
        execute(
            &mut transfer,
            &TransferCommand::ConfirmTransfer(ConfirmTransfer {
                transfer_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let mut book = StockBook::new();
        book.load(StockRecord::assign(p, a, 5, test_time()).unwrap());
        assert!(matches!(
            post_transfer(&transfer, &mut book, test_time()),
            Err(DomainError::InvalidTransferState { .. })
        ));
    }
}
