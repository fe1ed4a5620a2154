use super::model::{OrderPatch, RaiseFlags};
use super::{OrderStore, OrderTx};
use crate::model::{DeliveryType, ItemRecord, LocalStatus, Order, OrderItem, OrderRecord};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::str::FromStr;
use tracing::{debug, instrument};

pub type Pool = SqlitePool;

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";
const SAVEPOINT: &str = "pedido";

const ORDER_COLUMNS: &str = "id, numero_pedido, nome_cliente, telefone_cliente, data_agendamento, \
    horario_agendamento, status, tipo_entrega, endereco_entrega, observacoes, valor_total, \
    editado_manualmente, status_editado_manualmente, is_feito, data_criacao, data_atualizacao";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database URL {normalized}"))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .context("failed to open database")?;
    Ok(pool)
}

/// Expand a leading `~/` in file-backed SQLite URLs and create the parent
/// directory. In-memory and non-sqlite URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{path}?{q}"),
        None => format!("sqlite://{path}"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn parse_decimal(raw: &str, column: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim()).with_context(|| format!("invalid {column} value {raw:?}"))
}

fn order_from_row(row: &SqliteRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let tipo: String = row.try_get("tipo_entrega")?;
    let data: String = row.try_get("data_agendamento")?;
    let horario: String = row.try_get("horario_agendamento")?;
    let valor: String = row.try_get("valor_total")?;
    Ok(Order {
        id: row.try_get("id")?,
        numero_pedido: row.try_get("numero_pedido")?,
        nome_cliente: row.try_get("nome_cliente")?,
        telefone_cliente: row.try_get("telefone_cliente")?,
        data_agendamento: NaiveDate::parse_from_str(&data, DATE_FMT)
            .with_context(|| format!("invalid data_agendamento {data:?}"))?,
        horario_agendamento: NaiveTime::parse_from_str(&horario, TIME_FMT)
            .with_context(|| format!("invalid horario_agendamento {horario:?}"))?,
        status: LocalStatus::parse_label(&status)
            .ok_or_else(|| anyhow!("unknown status {status:?}"))?,
        tipo_entrega: DeliveryType::parse_kind(&tipo)
            .ok_or_else(|| anyhow!("unknown tipo_entrega {tipo:?}"))?,
        endereco_entrega: row.try_get("endereco_entrega")?,
        observacoes: row.try_get("observacoes")?,
        valor_total: parse_decimal(&valor, "valor_total")?,
        editado_manualmente: row.try_get("editado_manualmente")?,
        status_editado_manualmente: row.try_get("status_editado_manualmente")?,
        is_feito: row.try_get("is_feito")?,
        data_criacao: row.try_get("data_criacao")?,
        data_atualizacao: row.try_get("data_atualizacao")?,
    })
}

fn item_from_row(row: &SqliteRow) -> Result<OrderItem> {
    let unit: String = row.try_get("preco_unitario")?;
    let total: String = row.try_get("preco_total")?;
    Ok(OrderItem {
        id: row.try_get("id")?,
        pedido_id: row.try_get("pedido_id")?,
        item_id: row.try_get("item_id")?,
        quantidade: row.try_get("quantidade")?,
        preco_unitario: parse_decimal(&unit, "preco_unitario")?,
        preco_total: parse_decimal(&total, "preco_total")?,
        observacoes: row.try_get("observacoes")?,
    })
}

/// Escape `%`, `_` and the escape char itself for `LIKE ... ESCAPE '\'`.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[instrument(skip_all)]
pub async fn find_order(conn: &mut SqliteConnection, numero_pedido: &str) -> Result<Option<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM pedidos WHERE numero_pedido = ?");
    let row = sqlx::query(&sql)
        .bind(numero_pedido)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(order_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn find_order_items(conn: &mut SqliteConnection, order_id: i64) -> Result<Vec<OrderItem>> {
    let rows = sqlx::query(
        "SELECT id, pedido_id, item_id, quantidade, preco_unitario, preco_total, observacoes \
         FROM pedidos_itens WHERE pedido_id = ? ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(item_from_row).collect()
}

async fn insert_items(
    conn: &mut SqliteConnection,
    order_id: i64,
    items: &[ItemRecord],
) -> Result<()> {
    for item in items {
        sqlx::query(
            "INSERT INTO pedidos_itens (pedido_id, item_id, quantidade, preco_unitario, preco_total, observacoes) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(item.item_id)
        .bind(item.quantidade)
        .bind(item.preco_unitario.to_string())
        .bind(item.preco_total.to_string())
        .bind(&item.observacoes)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("insert item {} of order {order_id}", item.item_id))?;
    }
    Ok(())
}

#[instrument(skip_all, fields(numero_pedido = %order.numero_pedido))]
pub async fn insert_order(
    conn: &mut SqliteConnection,
    order: &OrderRecord,
    items: &[ItemRecord],
) -> Result<i64> {
    let id: i64 = sqlx::query(
        "INSERT INTO pedidos (numero_pedido, nome_cliente, telefone_cliente, data_agendamento, \
         horario_agendamento, status, tipo_entrega, endereco_entrega, observacoes, valor_total) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&order.numero_pedido)
    .bind(&order.customer.name)
    .bind(&order.customer.phone)
    .bind(order.data_agendamento.format(DATE_FMT).to_string())
    .bind(order.horario_agendamento.format(TIME_FMT).to_string())
    .bind(order.status.as_str())
    .bind(order.tipo_entrega.as_str())
    .bind(&order.endereco_entrega)
    .bind(&order.observacoes)
    .bind(order.valor_total.to_string())
    .fetch_one(&mut *conn)
    .await
    .context("insert order")?
    .get::<i64, _>("id");

    insert_items(conn, id, items).await?;
    debug!(order_id = id, items = items.len(), "order inserted");
    Ok(id)
}

/// Apply the set fields of `patch` and bump `data_atualizacao`.
#[instrument(skip_all, fields(order_id = order_id))]
pub async fn update_order(
    conn: &mut SqliteConnection,
    order_id: i64,
    patch: &OrderPatch,
) -> Result<()> {
    let res = sqlx::query(
        "UPDATE pedidos SET \
           nome_cliente = COALESCE(?, nome_cliente), \
           telefone_cliente = COALESCE(?, telefone_cliente), \
           data_agendamento = COALESCE(?, data_agendamento), \
           horario_agendamento = COALESCE(?, horario_agendamento), \
           status = COALESCE(?, status), \
           tipo_entrega = COALESCE(?, tipo_entrega), \
           endereco_entrega = COALESCE(?, endereco_entrega), \
           observacoes = COALESCE(?, observacoes), \
           valor_total = COALESCE(?, valor_total), \
           data_atualizacao = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(patch.nome_cliente.as_deref())
    .bind(patch.telefone_cliente.as_deref())
    .bind(patch.data_agendamento.map(|d| d.format(DATE_FMT).to_string()))
    .bind(patch.horario_agendamento.map(|t| t.format(TIME_FMT).to_string()))
    .bind(patch.status.map(|s| s.as_str()))
    .bind(patch.tipo_entrega.map(|t| t.as_str()))
    .bind(patch.endereco_entrega.as_deref())
    .bind(patch.observacoes.as_deref())
    .bind(patch.valor_total.map(|v| v.to_string()))
    .bind(order_id)
    .execute(&mut *conn)
    .await?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("order {order_id} not found"));
    }
    Ok(())
}

/// Raise override flags. A flag already set stays set.
async fn raise_flags(conn: &mut SqliteConnection, order_id: i64, flags: RaiseFlags) -> Result<()> {
    sqlx::query(
        "UPDATE pedidos SET \
           editado_manualmente = MAX(editado_manualmente, ?), \
           status_editado_manualmente = MAX(status_editado_manualmente, ?) \
         WHERE id = ?",
    )
    .bind(flags.editado_manualmente)
    .bind(flags.status_editado_manualmente)
    .bind(order_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[instrument(skip_all, fields(order_id = order_id, items = items.len()))]
pub async fn replace_order_items(
    conn: &mut SqliteConnection,
    order_id: i64,
    items: &[ItemRecord],
) -> Result<()> {
    sqlx::query("DELETE FROM pedidos_itens WHERE pedido_id = ?")
        .bind(order_id)
        .execute(&mut *conn)
        .await?;
    insert_items(conn, order_id, items).await?;
    sqlx::query("UPDATE pedidos SET data_atualizacao = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(order_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn catalog_item_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<i64>> {
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM itens WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

/// First catalog item (lowest id) whose name contains `name`.
pub async fn catalog_item_by_name(conn: &mut SqliteConnection, name: &str) -> Result<Option<i64>> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(None);
    }
    let id = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM itens WHERE nome LIKE ? ESCAPE '\\' ORDER BY id LIMIT 1",
    )
    .bind(format!("%{}%", escape_like(name)))
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn get_order_by_numero(pool: &Pool, numero_pedido: &str) -> Result<Option<Order>> {
    let mut conn = pool.acquire().await?;
    find_order(&mut conn, numero_pedido).await
}

#[instrument(skip_all)]
pub async fn list_order_items(pool: &Pool, order_id: i64) -> Result<Vec<OrderItem>> {
    let mut conn = pool.acquire().await?;
    find_order_items(&mut conn, order_id).await
}

/// Insert or update a catalog entry. `id = None` lets SQLite assign one.
#[instrument(skip_all)]
pub async fn upsert_catalog_item(
    pool: &Pool,
    id: Option<i64>,
    nome: &str,
    preco: Decimal,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO itens (id, nome, preco) VALUES (?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET nome = excluded.nome, preco = excluded.preco \
         RETURNING id",
    )
    .bind(id)
    .bind(nome)
    .bind(preco.to_string())
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Operator edit from the dashboard: apply the patch and raise the override
/// flags matching the fields it touches.
#[instrument(skip_all, fields(order_id = order_id))]
pub async fn mark_manual_edit(pool: &Pool, order_id: i64, patch: &OrderPatch) -> Result<()> {
    if patch.is_empty() {
        return Ok(());
    }
    let mut tx = pool.begin().await?;
    update_order(&mut tx, order_id, patch).await?;
    raise_flags(&mut tx, order_id, RaiseFlags::for_operator_edit(patch)).await?;
    tx.commit().await?;
    Ok(())
}

#[instrument(skip_all, fields(order_id = order_id, feito = feito))]
pub async fn mark_feito(pool: &Pool, order_id: i64, feito: bool) -> Result<()> {
    let res = sqlx::query("UPDATE pedidos SET is_feito = ? WHERE id = ?")
        .bind(feito)
        .bind(order_id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("order {order_id} not found"));
    }
    Ok(())
}

/// Production [`OrderStore`] over a SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for SqliteStore {
    async fn begin(&self) -> Result<Box<dyn OrderTx>> {
        let tx = self.pool.begin().await.context("begin transaction")?;
        Ok(Box::new(SqliteTx { tx }))
    }
}

pub struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
}

impl SqliteTx {
    async fn exec(&mut self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&mut *self.tx).await?;
        Ok(())
    }
}

#[async_trait]
impl OrderTx for SqliteTx {
    async fn find_order(&mut self, numero_pedido: &str) -> Result<Option<Order>> {
        find_order(&mut self.tx, numero_pedido).await
    }

    async fn order_items(&mut self, order_id: i64) -> Result<Vec<OrderItem>> {
        find_order_items(&mut self.tx, order_id).await
    }

    async fn insert_order(&mut self, order: &OrderRecord, items: &[ItemRecord]) -> Result<i64> {
        insert_order(&mut self.tx, order, items).await
    }

    async fn apply_patch(&mut self, order_id: i64, patch: &OrderPatch) -> Result<()> {
        update_order(&mut self.tx, order_id, patch).await
    }

    async fn replace_items(&mut self, order_id: i64, items: &[ItemRecord]) -> Result<()> {
        replace_order_items(&mut self.tx, order_id, items).await
    }

    async fn find_catalog_item_by_id(&mut self, id: i64) -> Result<Option<i64>> {
        catalog_item_by_id(&mut self.tx, id).await
    }

    async fn find_catalog_item_by_name(&mut self, name: &str) -> Result<Option<i64>> {
        catalog_item_by_name(&mut self.tx, name).await
    }

    async fn savepoint(&mut self) -> Result<()> {
        self.exec(&format!("SAVEPOINT {SAVEPOINT}")).await
    }

    async fn release_savepoint(&mut self) -> Result<()> {
        self.exec(&format!("RELEASE SAVEPOINT {SAVEPOINT}")).await
    }

    async fn rollback_to_savepoint(&mut self) -> Result<()> {
        self.exec(&format!("ROLLBACK TO SAVEPOINT {SAVEPOINT}"))
            .await?;
        self.exec(&format!("RELEASE SAVEPOINT {SAVEPOINT}")).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.context("commit transaction")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.context("rollback transaction")
    }
}
