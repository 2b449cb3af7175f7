use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use deadpool_postgres::Transaction;
use log::error;
use tokio_postgres::{types::ToSql, Row};

use crate::{
    db::{
        models::{
            LiquidityQueueItem, PendingCounter, Position, QueueStatus, SyncState,
        },
        postgres::PostgresClient,
        LedgerStore, RangeChanges,
    },
    utils::{decimal_text, parse_decimal},
};

type SqlParam = Box<dyn ToSql + Sync + Send>;

/// Column cast for NUMERIC values bound as text.
const NUMERIC: &str = "::text::numeric";
/// Bind parameters per statement, below the protocol limit of 65535.
const MAX_PARAMS: usize = 60_000;

const POSITION_COLUMNS: &[(&str, &str)] = &[
    ("id", ""),
    ("account", ""),
    ("underlying_asset_index", ""),
    ("expiry", ""),
    ("option_token_id", ""),
    ("length", ""),
    ("is_buys", ""),
    ("strike_prices", ""),
    ("is_calls", ""),
    ("option_names", ""),
    ("size", NUMERIC),
    ("size_opened", NUMERIC),
    ("size_closing", NUMERIC),
    ("size_closed", NUMERIC),
    ("size_settled", NUMERIC),
    ("size_transferred_in", NUMERIC),
    ("size_transferred_out", NUMERIC),
    ("is_buy", ""),
    ("execution_price", NUMERIC),
    ("opened_token", ""),
    ("opened_amount", NUMERIC),
    ("opened_collateral_token", ""),
    ("opened_collateral_amount", NUMERIC),
    ("opened_avg_execution_price", NUMERIC),
    ("opened_avg_spot_price", NUMERIC),
    ("closed_token", ""),
    ("closed_amount", NUMERIC),
    ("closed_collateral_token", ""),
    ("closed_collateral_amount", NUMERIC),
    ("closed_avg_execution_price", NUMERIC),
    ("closed_avg_spot_price", NUMERIC),
    ("settled_token", ""),
    ("settled_amount", NUMERIC),
    ("settled_collateral_token", ""),
    ("settled_collateral_amount", NUMERIC),
    ("settled_price", NUMERIC),
    ("is_settled", ""),
    ("last_process_block_time", ""),
];

const HISTORY_COLUMNS: &[(&str, &str)] = &[
    ("position_id", ""),
    ("block_number", ""),
    ("log_index", ""),
    ("id", ""),
    ("transaction_hash", ""),
    ("type", ""),
    ("account", ""),
    ("request_index", NUMERIC),
    ("underlying_asset_index", ""),
    ("expiry", ""),
    ("option_token_id", ""),
    ("size", NUMERIC),
    ("quote_token", ""),
    ("quote_amount", NUMERIC),
    ("collateral_token", ""),
    ("collateral_amount", NUMERIC),
    ("execution_price", NUMERIC),
    ("avg_execution_price", NUMERIC),
    ("settle_price", NUMERIC),
    ("settle_payoff", NUMERIC),
    ("spot_price", NUMERIC),
    ("cash_flow", NUMERIC),
    ("pnl", NUMERIC),
    ("roi", NUMERIC),
    ("process_block_time", ""),
];

const QUEUE_COLUMNS: &[(&str, &str)] = &[
    ("id", ""),
    ("queue_address", ""),
    ("queue_index", ""),
    ("action_type", ""),
    ("user_address", ""),
    ("token", ""),
    ("amount", NUMERIC),
    ("min_out", NUMERIC),
    ("receiver", ""),
    ("is_native", ""),
    ("status", ""),
    ("amount_out", NUMERIC),
    ("olp_price", NUMERIC),
    ("cancel_reason", ""),
    ("enqueued_block_time", ""),
    ("process_block_time", ""),
];

fn num(value: &BigDecimal) -> SqlParam {
    Box::new(decimal_text(value))
}

fn int(value: u64) -> SqlParam {
    Box::new(value as i64)
}

fn text(value: &str) -> SqlParam {
    Box::new(value.to_string())
}

fn opt_text(value: &Option<String>) -> SqlParam {
    Box::new(value.clone())
}

fn integer(value: u16) -> SqlParam {
    Box::new(i32::from(value))
}

fn small(value: u8) -> SqlParam {
    Box::new(i16::from(value))
}

fn boolean(value: bool) -> SqlParam {
    Box::new(value)
}

/// SELECT list reading NUMERIC columns back as text.
fn select_list(columns: &[(&str, &str)]) -> String {
    columns
        .iter()
        .map(|(name, cast)| {
            if cast.is_empty() {
                name.to_string()
            } else {
                format!("{}::text AS {}", name, name)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Multi-row INSERT chunked under the bind parameter limit.
async fn insert_rows(
    tx: &Transaction<'_>,
    table: &str,
    columns: &[(&str, &str)],
    on_conflict: &str,
    rows: Vec<Vec<SqlParam>>,
) -> anyhow::Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let names = columns
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ");
    let batch_size = (MAX_PARAMS / columns.len()).max(1);

    for chunk in rows.chunks(batch_size) {
        // Build VALUES placeholders: ($1,$2::text::numeric,...), ...
        let values_clauses: Vec<String> = chunk
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let start = i * columns.len() + 1;
                let placeholders: Vec<String> = columns
                    .iter()
                    .enumerate()
                    .map(|(j, (_, cast))| format!("${}{}", start + j, cast))
                    .collect();
                format!("({})", placeholders.join(", "))
            })
            .collect();

        let query = format!(
            "INSERT INTO ledger.{} ({}) VALUES {} {}",
            table,
            names,
            values_clauses.join(", "),
            on_conflict
        );

        let params: Vec<&(dyn ToSql + Sync)> = chunk
            .iter()
            .flatten()
            .map(|param| &**param as &(dyn ToSql + Sync))
            .collect();

        tx.execute(query.as_str(), &params).await.map_err(|e| {
            error!("Failed to write {} rows into {}: {:?}", chunk.len(), table, e);
            e
        })?;
    }

    Ok(())
}

impl PostgresClient {
    // ==================== COUNTER OUTBOX ====================

    /// Oldest undrained counter intents.
    pub async fn fetch_pending_counters(&self, limit: i64) -> anyhow::Result<Vec<PendingCounter>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT id, idempotency_key, counter_key, delta::text AS delta, created_at
            FROM ledger.counter_outbox
            WHERE drained_at IS NULL
            ORDER BY id
            LIMIT $1
        "#;

        let rows = client.query(query, &[&limit]).await?;
        Ok(rows
            .iter()
            .map(|row| PendingCounter {
                id: row.get("id"),
                idempotency_key: row.get("idempotency_key"),
                counter_key: row.get("counter_key"),
                delta: row.get("delta"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    pub async fn mark_counters_drained(&self, ids: &[i64]) -> anyhow::Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let client = self.pool.get().await?;
        let query = "UPDATE ledger.counter_outbox SET drained_at = NOW() WHERE id = ANY($1)";

        let updated = client.execute(query, &[&ids]).await.map_err(|e| {
            error!("Failed to mark {} counter intents drained: {:?}", ids.len(), e);
            e
        })?;

        Ok(updated)
    }
}

#[async_trait]
impl LedgerStore for PostgresClient {
    // ==================== SYNC CURSOR ====================

    async fn load_sync_state(&self) -> anyhow::Result<Option<SyncState>> {
        let client = self.pool.get().await?;
        let query = "SELECT block_number, updated_at FROM ledger.sync_cursor WHERE id = 1";

        let row = client.query_opt(query, &[]).await?;

        Ok(row.map(|r| SyncState {
            block_number: r.get::<_, i64>("block_number") as u64,
            updated_at: r.get("updated_at"),
        }))
    }

    // ==================== POSITIONS ====================

    async fn load_positions(&self, ids: &[String]) -> anyhow::Result<Vec<Position>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM ledger.positions WHERE id = ANY($1)",
            select_list(POSITION_COLUMNS)
        );

        let rows = client.query(query.as_str(), &[&ids]).await?;
        rows.iter().map(row_to_position).collect()
    }

    // ==================== LIQUIDITY QUEUE ====================

    async fn load_queue_items(&self, ids: &[String]) -> anyhow::Result<Vec<LiquidityQueueItem>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM ledger.liquidity_queue_items WHERE id = ANY($1)",
            select_list(QUEUE_COLUMNS)
        );

        let rows = client.query(query.as_str(), &[&ids]).await?;
        rows.iter().map(row_to_queue_item).collect()
    }

    // ==================== RANGE COMMIT ====================

    async fn commit_range(&self, changes: &RangeChanges, state: &SyncState) -> anyhow::Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client
            .transaction()
            .await
            .context("Failed to open range transaction")?;

        // Positions first, history rows reference them.
        let positions = changes
            .positions
            .iter()
            .map(|p| -> Vec<SqlParam> {
                vec![
                    text(&p.id),
                    text(&p.account),
                    integer(p.underlying_asset_index),
                    int(p.expiry),
                    text(&p.option_token_id),
                    small(p.length),
                    text(&p.is_buys),
                    text(&p.strike_prices),
                    text(&p.is_calls),
                    text(&p.option_names),
                    num(&p.size),
                    num(&p.size_opened),
                    num(&p.size_closing),
                    num(&p.size_closed),
                    num(&p.size_settled),
                    num(&p.size_transferred_in),
                    num(&p.size_transferred_out),
                    boolean(p.is_buy),
                    num(&p.execution_price),
                    text(&p.opened_token),
                    num(&p.opened_amount),
                    text(&p.opened_collateral_token),
                    num(&p.opened_collateral_amount),
                    num(&p.opened_avg_execution_price),
                    num(&p.opened_avg_spot_price),
                    text(&p.closed_token),
                    num(&p.closed_amount),
                    text(&p.closed_collateral_token),
                    num(&p.closed_collateral_amount),
                    num(&p.closed_avg_execution_price),
                    num(&p.closed_avg_spot_price),
                    text(&p.settled_token),
                    num(&p.settled_amount),
                    text(&p.settled_collateral_token),
                    num(&p.settled_collateral_amount),
                    num(&p.settled_price),
                    boolean(p.is_settled),
                    int(p.last_process_block_time),
                ]
            })
            .collect();
        let position_updates = POSITION_COLUMNS
            .iter()
            .skip(1)
            .map(|(name, _)| format!("{} = EXCLUDED.{}", name, name))
            .collect::<Vec<_>>()
            .join(", ");
        insert_rows(
            &tx,
            "positions",
            POSITION_COLUMNS,
            &format!("ON CONFLICT (id) DO UPDATE SET {}", position_updates),
            positions,
        )
        .await?;

        let history = changes
            .history
            .iter()
            .map(|h| -> Vec<SqlParam> {
                vec![
                    text(&h.position_id),
                    int(h.block_number),
                    int(h.log_index),
                    text(&h.id),
                    text(&h.transaction_hash),
                    text(h.kind.as_str()),
                    text(&h.account),
                    num(&h.request_index),
                    integer(h.underlying_asset_index),
                    int(h.expiry),
                    text(&h.option_token_id),
                    num(&h.size),
                    text(&h.quote_token),
                    num(&h.quote_amount),
                    text(&h.collateral_token),
                    num(&h.collateral_amount),
                    num(&h.execution_price),
                    num(&h.avg_execution_price),
                    num(&h.settle_price),
                    num(&h.settle_payoff),
                    num(&h.spot_price),
                    num(&h.cash_flow),
                    num(&h.pnl),
                    num(&h.roi),
                    int(h.process_block_time),
                ]
            })
            .collect();
        insert_rows(
            &tx,
            "position_history",
            HISTORY_COLUMNS,
            "ON CONFLICT (position_id, block_number, log_index) DO NOTHING",
            history,
        )
        .await?;

        let daily = changes
            .daily
            .iter()
            .map(|d| -> Vec<SqlParam> {
                vec![
                    text(&d.id),
                    integer(d.underlying_asset_index),
                    num(&d.accumulated_notional_volume),
                    num(&d.accumulated_execution_price),
                ]
            })
            .collect();
        insert_rows(
            &tx,
            "daily_aggregates AS d",
            &[
                ("id", ""),
                ("underlying_asset_index", ""),
                ("accumulated_notional_volume", NUMERIC),
                ("accumulated_execution_price", NUMERIC),
            ],
            r#"ON CONFLICT (id) DO UPDATE SET
                accumulated_notional_volume = d.accumulated_notional_volume + EXCLUDED.accumulated_notional_volume,
                accumulated_execution_price = d.accumulated_execution_price + EXCLUDED.accumulated_execution_price"#,
            daily,
        )
        .await?;

        if let Some(watermark) = &changes.watermark {
            insert_rows(
                &tx,
                "request_index_watermark",
                &[("id", ""), ("request_index", NUMERIC), ("process_block_time", "")],
                r#"ON CONFLICT (id) DO UPDATE SET
                    request_index = EXCLUDED.request_index,
                    process_block_time = EXCLUDED.process_block_time"#,
                vec![vec![
                    Box::new(1i16) as SqlParam,
                    text(&watermark.request_index),
                    int(watermark.process_block_time),
                ]],
            )
            .await?;
        }

        let counters = changes
            .counters
            .iter()
            .map(|c| -> Vec<SqlParam> {
                vec![
                    text(&c.idempotency_key),
                    text(&c.counter_key),
                    num(&c.delta),
                ]
            })
            .collect();
        insert_rows(
            &tx,
            "counter_outbox",
            &[("idempotency_key", ""), ("counter_key", ""), ("delta", NUMERIC)],
            "ON CONFLICT (idempotency_key) DO NOTHING",
            counters,
        )
        .await?;

        let settle_prices = changes
            .settle_prices
            .iter()
            .map(|s| -> Vec<SqlParam> {
                vec![
                    text(&s.id),
                    text(&s.underlying_asset),
                    int(s.expiry),
                    num(&s.settle_price),
                    int(s.process_block_time),
                ]
            })
            .collect();
        insert_rows(
            &tx,
            "settle_prices",
            &[
                ("id", ""),
                ("underlying_asset", ""),
                ("expiry", ""),
                ("settle_price", NUMERIC),
                ("process_block_time", ""),
            ],
            "ON CONFLICT (id) DO NOTHING",
            settle_prices,
        )
        .await?;

        let fees = changes
            .fees
            .iter()
            .map(|f| -> Vec<SqlParam> {
                vec![
                    text(&f.id),
                    text(f.kind.as_str()),
                    text(&f.vault),
                    opt_text(&f.account),
                    text(&f.token),
                    num(&f.fee_usd),
                    num(&f.fee_amount),
                    Box::new(f.is_settle) as SqlParam,
                    int(f.process_block_time),
                ]
            })
            .collect();
        insert_rows(
            &tx,
            "collected_fees",
            &[
                ("id", ""),
                ("kind", ""),
                ("vault", ""),
                ("account", ""),
                ("token", ""),
                ("fee_usd", NUMERIC),
                ("fee_amount", NUMERIC),
                ("is_settle", ""),
                ("process_block_time", ""),
            ],
            "ON CONFLICT (id) DO NOTHING",
            fees,
        )
        .await?;

        let queue_items = changes
            .queue_items
            .iter()
            .map(|q| -> Vec<SqlParam> {
                vec![
                    text(&q.id),
                    text(&q.queue_address),
                    text(&q.queue_index),
                    small(q.action_type),
                    text(&q.user),
                    text(&q.token),
                    num(&q.amount),
                    num(&q.min_out),
                    text(&q.receiver),
                    boolean(q.is_native),
                    text(q.status.as_str()),
                    num(&q.amount_out),
                    num(&q.olp_price),
                    Box::new(q.cancel_reason.map(i16::from)) as SqlParam,
                    int(q.enqueued_block_time),
                    int(q.process_block_time),
                ]
            })
            .collect();
        insert_rows(
            &tx,
            "liquidity_queue_items",
            QUEUE_COLUMNS,
            r#"ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                amount_out = EXCLUDED.amount_out,
                olp_price = EXCLUDED.olp_price,
                cancel_reason = EXCLUDED.cancel_reason,
                process_block_time = EXCLUDED.process_block_time"#,
            queue_items,
        )
        .await?;

        let usdg_swaps = changes
            .usdg_swaps
            .iter()
            .map(|u| -> Vec<SqlParam> {
                vec![
                    text(&u.id),
                    text(&u.vault),
                    boolean(u.is_buy),
                    text(&u.account),
                    text(&u.token),
                    num(&u.token_amount),
                    num(&u.usdg_amount),
                    num(&u.fee_basis_points),
                    int(u.process_block_time),
                ]
            })
            .collect();
        insert_rows(
            &tx,
            "usdg_swaps",
            &[
                ("id", ""),
                ("vault", ""),
                ("is_buy", ""),
                ("account", ""),
                ("token", ""),
                ("token_amount", NUMERIC),
                ("usdg_amount", NUMERIC),
                ("fee_basis_points", NUMERIC),
                ("process_block_time", ""),
            ],
            "ON CONFLICT (id) DO NOTHING",
            usdg_swaps,
        )
        .await?;

        let liquidity_changes = changes
            .liquidity_changes
            .iter()
            .map(|l| -> Vec<SqlParam> {
                vec![
                    text(&l.id),
                    text(l.direction.as_str()),
                    text(&l.account),
                    text(&l.olp),
                    text(&l.token),
                    num(&l.token_amount),
                    num(&l.olp_amount),
                    num(&l.aum_in_usdg),
                    num(&l.olp_supply),
                    num(&l.usdg_amount),
                    int(l.process_block_time),
                ]
            })
            .collect();
        insert_rows(
            &tx,
            "liquidity_changes",
            &[
                ("id", ""),
                ("direction", ""),
                ("account", ""),
                ("olp", ""),
                ("token", ""),
                ("token_amount", NUMERIC),
                ("olp_amount", NUMERIC),
                ("aum_in_usdg", NUMERIC),
                ("olp_supply", NUMERIC),
                ("usdg_amount", NUMERIC),
                ("process_block_time", ""),
            ],
            "ON CONFLICT (id) DO NOTHING",
            liquidity_changes,
        )
        .await?;

        let pending_amounts = changes
            .pending_amounts
            .iter()
            .map(|p| -> Vec<SqlParam> {
                vec![
                    text(&p.id),
                    text(&p.vault_utils),
                    small(p.price_type),
                    text(&p.token),
                    num(&p.pending_usd),
                    num(&p.pending_amount),
                    int(p.process_block_time),
                ]
            })
            .collect();
        insert_rows(
            &tx,
            "pending_amounts",
            &[
                ("id", ""),
                ("vault_utils", ""),
                ("price_type", ""),
                ("token", ""),
                ("pending_usd", NUMERIC),
                ("pending_amount", NUMERIC),
                ("process_block_time", ""),
            ],
            "ON CONFLICT (id) DO NOTHING",
            pending_amounts,
        )
        .await?;

        let dead_letters = changes
            .dead_letters
            .iter()
            .map(|d| -> Vec<SqlParam> {
                vec![
                    int(d.block_number),
                    text(&d.transaction_hash),
                    int(d.log_index),
                    text(&d.address),
                    text(&d.topic0),
                    text(&d.event),
                    text(&d.reason),
                    int(d.from_block),
                    int(d.to_block),
                ]
            })
            .collect();
        insert_rows(
            &tx,
            "dead_letters",
            &[
                ("block_number", ""),
                ("transaction_hash", ""),
                ("log_index", ""),
                ("address", ""),
                ("topic0", ""),
                ("event", ""),
                ("reason", ""),
                ("from_block", ""),
                ("to_block", ""),
            ],
            "ON CONFLICT (block_number, transaction_hash, log_index) DO NOTHING",
            dead_letters,
        )
        .await?;

        // Cursor last, inside the same transaction.
        tx.execute(
            r#"
            INSERT INTO ledger.sync_cursor (id, block_number, updated_at)
            VALUES (1, $1, $2)
            ON CONFLICT (id) DO UPDATE SET
                block_number = EXCLUDED.block_number,
                updated_at = EXCLUDED.updated_at
            "#,
            &[&(state.block_number as i64), &state.updated_at],
        )
        .await
        .map_err(|e| {
            error!("Failed to advance sync cursor to {}: {:?}", state.block_number, e);
            e
        })?;

        tx.commit()
            .await
            .with_context(|| format!("Failed to commit range ending at {}", state.block_number))?;

        Ok(())
    }
}

// ==================== HELPER FUNCTIONS ====================

fn numeric(row: &Row, column: &str) -> anyhow::Result<BigDecimal> {
    let value: String = row.get(column);
    parse_decimal(&value).with_context(|| format!("column {}", column))
}

fn row_to_position(row: &Row) -> anyhow::Result<Position> {
    Ok(Position {
        id: row.get("id"),
        account: row.get("account"),
        underlying_asset_index: u16::try_from(row.get::<_, i32>("underlying_asset_index"))?,
        expiry: row.get::<_, i64>("expiry") as u64,
        option_token_id: row.get("option_token_id"),
        length: u8::try_from(row.get::<_, i16>("length"))?,
        is_buys: row.get("is_buys"),
        strike_prices: row.get("strike_prices"),
        is_calls: row.get("is_calls"),
        option_names: row.get("option_names"),
        size: numeric(row, "size")?,
        size_opened: numeric(row, "size_opened")?,
        size_closing: numeric(row, "size_closing")?,
        size_closed: numeric(row, "size_closed")?,
        size_settled: numeric(row, "size_settled")?,
        size_transferred_in: numeric(row, "size_transferred_in")?,
        size_transferred_out: numeric(row, "size_transferred_out")?,
        is_buy: row.get("is_buy"),
        execution_price: numeric(row, "execution_price")?,
        opened_token: row.get("opened_token"),
        opened_amount: numeric(row, "opened_amount")?,
        opened_collateral_token: row.get("opened_collateral_token"),
        opened_collateral_amount: numeric(row, "opened_collateral_amount")?,
        opened_avg_execution_price: numeric(row, "opened_avg_execution_price")?,
        opened_avg_spot_price: numeric(row, "opened_avg_spot_price")?,
        closed_token: row.get("closed_token"),
        closed_amount: numeric(row, "closed_amount")?,
        closed_collateral_token: row.get("closed_collateral_token"),
        closed_collateral_amount: numeric(row, "closed_collateral_amount")?,
        closed_avg_execution_price: numeric(row, "closed_avg_execution_price")?,
        closed_avg_spot_price: numeric(row, "closed_avg_spot_price")?,
        settled_token: row.get("settled_token"),
        settled_amount: numeric(row, "settled_amount")?,
        settled_collateral_token: row.get("settled_collateral_token"),
        settled_collateral_amount: numeric(row, "settled_collateral_amount")?,
        settled_price: numeric(row, "settled_price")?,
        is_settled: row.get("is_settled"),
        last_process_block_time: row.get::<_, i64>("last_process_block_time") as u64,
    })
}

fn row_to_queue_item(row: &Row) -> anyhow::Result<LiquidityQueueItem> {
    let status: String = row.get("status");
    Ok(LiquidityQueueItem {
        id: row.get("id"),
        queue_address: row.get("queue_address"),
        queue_index: row.get("queue_index"),
        action_type: u8::try_from(row.get::<_, i16>("action_type"))?,
        user: row.get("user_address"),
        token: row.get("token"),
        amount: numeric(row, "amount")?,
        min_out: numeric(row, "min_out")?,
        receiver: row.get("receiver"),
        is_native: row.get("is_native"),
        status: QueueStatus::from_str(&status)?,
        amount_out: numeric(row, "amount_out")?,
        olp_price: numeric(row, "olp_price")?,
        cancel_reason: row
            .get::<_, Option<i16>>("cancel_reason")
            .map(u8::try_from)
            .transpose()?,
        enqueued_block_time: row.get::<_, i64>("enqueued_block_time") as u64,
        process_block_time: row.get::<_, i64>("process_block_time") as u64,
    })
}
