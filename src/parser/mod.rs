// Translates the restricted SQL surface (SELECT/INSERT/DELETE/UPDATE/CREATE
// TABLE/VIEW/INDEX) into the planner's data carriers. Parsing itself is
// delegated to `sqlparser`; this module only walks the resulting AST and
// rejects anything outside the supported grammar.

use sqlparser::ast::{
    self, ColumnDef, DataType, Expr, ObjectName, Query, SelectItem, SetExpr, Statement,
    TableFactor, TableObject, Value,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;

use crate::error::{DbError, Result};
use crate::record::Schema;
use crate::scan::{Constant, Expression, Predicate, Term};

#[derive(Debug, Clone)]
pub struct QueryData {
    pub fields: Vec<String>,
    pub tables: Vec<String>,
    pub pred: Predicate,
}

impl std::fmt::Display for QueryData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "select {} from {}", self.fields.join(", "), self.tables.join(", "))?;
        if !self.pred.terms().is_empty() {
            write!(f, " where {}", self.pred)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct InsertData {
    pub tblname: String,
    pub flds: Vec<String>,
    pub vals: Vec<Constant>,
}

#[derive(Debug, Clone)]
pub struct DeleteData {
    pub tblname: String,
    pub pred: Predicate,
}

#[derive(Debug, Clone)]
pub struct ModifyData {
    pub tblname: String,
    pub fldname: String,
    pub newval: Expression,
    pub pred: Predicate,
}

#[derive(Debug, Clone)]
pub struct CreateTableData {
    pub tblname: String,
    pub sch: Schema,
}

#[derive(Debug, Clone)]
pub struct CreateViewData {
    pub viewname: String,
    pub qrydata: QueryData,
}

#[derive(Debug, Clone)]
pub struct CreateIndexData {
    pub idxname: String,
    pub tblname: String,
    pub fldname: String,
}

/// Every statement the engine understands, after translation from the
/// `sqlparser` AST.
#[derive(Debug, Clone)]
pub enum UpdateCmd {
    Insert(InsertData),
    Delete(DeleteData),
    Modify(ModifyData),
    CreateTable(CreateTableData),
    CreateView(CreateViewData),
    CreateIndex(CreateIndexData),
}

fn bad_syntax(msg: impl Into<String>) -> DbError {
    DbError::BadSyntax(msg.into())
}

fn object_name_to_string(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|part| part.as_ident().map(|ident| ident.value.to_lowercase()).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(".")
}

fn parse_one_statement(sql: &str) -> Result<Statement> {
    let dialect = GenericDialect {};
    let mut statements = SqlParser::parse_sql(&dialect, sql).map_err(|e| bad_syntax(e.to_string()))?;
    if statements.len() != 1 {
        return Err(bad_syntax("expected exactly one statement"));
    }
    Ok(statements.remove(0))
}

/// Parses a single `SELECT` statement into a `QueryData`.
pub fn parse_query(sql: &str) -> Result<QueryData> {
    let stmt = parse_one_statement(sql)?;
    query_data_from_statement(&stmt)
}

fn query_data_from_statement(stmt: &Statement) -> Result<QueryData> {
    let query = match stmt {
        Statement::Query(q) => q.as_ref(),
        _ => return Err(bad_syntax("expected a select statement")),
    };
    query_data_from_query(query)
}

fn query_data_from_query(query: &Query) -> Result<QueryData> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s.as_ref(),
        _ => return Err(bad_syntax("only plain select is supported")),
    };

    let mut fields = Vec::new();
    for item in &select.projection {
        match item {
            SelectItem::UnnamedExpr(Expr::Identifier(ident)) => fields.push(ident.value.to_lowercase()),
            _ => return Err(bad_syntax("select list must be a list of field names")),
        }
    }

    let mut tables = Vec::new();
    for twj in &select.from {
        match &twj.relation {
            TableFactor::Table { name, .. } => tables.push(object_name_to_string(name)),
            _ => return Err(bad_syntax("from list must be a list of table names")),
        }
        if !twj.joins.is_empty() {
            return Err(bad_syntax("explicit joins are not supported, list tables and filter in where"));
        }
    }

    let pred = match &select.selection {
        Some(expr) => predicate_from_expr(expr)?,
        None => Predicate::new(),
    };

    Ok(QueryData { fields, tables, pred })
}

fn predicate_from_expr(expr: &Expr) -> Result<Predicate> {
    match expr {
        Expr::BinaryOp { left, op: ast::BinaryOperator::And, right } => {
            let mut p = predicate_from_expr(left)?;
            p.conjoin_with(predicate_from_expr(right)?);
            Ok(p)
        }
        Expr::BinaryOp { left, op: ast::BinaryOperator::Eq, right } => {
            let lhs = expression_from_expr(left)?;
            let rhs = expression_from_expr(right)?;
            Ok(Predicate::from_term(Term::new(lhs, rhs)))
        }
        _ => Err(bad_syntax("where clause must be a conjunction of equalities")),
    }
}

fn expression_from_expr(expr: &Expr) -> Result<Expression> {
    match expr {
        Expr::Identifier(ident) => Ok(Expression::Field(ident.value.to_lowercase())),
        Expr::Value(v) => Ok(Expression::Val(constant_from_value(&v.value)?)),
        _ => Err(bad_syntax("expected a field name or literal constant")),
    }
}

fn constant_from_value(v: &Value) -> Result<Constant> {
    match v {
        Value::Number(n, _) => n
            .parse::<i32>()
            .map(Constant::Int)
            .map_err(|_| bad_syntax(format!("not a valid integer constant: {n}"))),
        Value::SingleQuotedString(s) => Ok(Constant::Str(s.clone())),
        other => Err(bad_syntax(format!("unsupported literal: {other}"))),
    }
}

/// Parses a single update command: `INSERT`/`DELETE`/`UPDATE`/`CREATE TABLE`/
/// `CREATE VIEW`/`CREATE INDEX`.
pub fn parse_update_cmd(sql: &str) -> Result<UpdateCmd> {
    let stmt = parse_one_statement(sql)?;
    match &stmt {
        Statement::Insert(insert) => insert_data(insert).map(UpdateCmd::Insert),
        Statement::Delete(delete) => delete_data(delete).map(UpdateCmd::Delete),
        Statement::Update(update) => {
            modify_data(&update.table, &update.assignments, &update.selection).map(UpdateCmd::Modify)
        }
        Statement::CreateTable(ct) => create_table_data(ct).map(UpdateCmd::CreateTable),
        Statement::CreateView(cv) => create_view_data(&cv.name, &cv.query).map(UpdateCmd::CreateView),
        Statement::CreateIndex(ci) => create_index_data(ci).map(UpdateCmd::CreateIndex),
        _ => Err(bad_syntax("unsupported statement")),
    }
}

fn insert_data(insert: &ast::Insert) -> Result<InsertData> {
    let tblname = match &insert.table {
        TableObject::TableName(name) => object_name_to_string(name),
        _ => return Err(bad_syntax("insert target must be a table name")),
    };
    let flds = insert.columns.iter().map(|c| c.value.to_lowercase()).collect();
    let source = insert
        .source
        .as_ref()
        .ok_or_else(|| bad_syntax("insert requires a values list"))?;
    let select = match source.body.as_ref() {
        SetExpr::Values(values) => values,
        _ => return Err(bad_syntax("insert requires a values list")),
    };
    let row = select
        .rows
        .first()
        .ok_or_else(|| bad_syntax("insert requires one row of values"))?;
    let mut vals = Vec::new();
    for expr in row {
        match expr {
            Expr::Value(v) => vals.push(constant_from_value(&v.value)?),
            _ => return Err(bad_syntax("insert values must be literal constants")),
        }
    }
    Ok(InsertData { tblname, flds, vals })
}

fn delete_data(delete: &ast::Delete) -> Result<DeleteData> {
    let tblname = match &delete.from {
        ast::FromTable::WithFromKeyword(tables) | ast::FromTable::WithoutKeyword(tables) => {
            let twj = tables.first().ok_or_else(|| bad_syntax("delete requires a table"))?;
            match &twj.relation {
                TableFactor::Table { name, .. } => object_name_to_string(name),
                _ => return Err(bad_syntax("delete target must be a table name")),
            }
        }
    };
    let pred = match &delete.selection {
        Some(expr) => predicate_from_expr(expr)?,
        None => Predicate::new(),
    };
    Ok(DeleteData { tblname, pred })
}

fn modify_data(table: &ast::TableWithJoins, assignments: &[ast::Assignment], selection: &Option<Expr>) -> Result<ModifyData> {
    let tblname = match &table.relation {
        TableFactor::Table { name, .. } => object_name_to_string(name),
        _ => return Err(bad_syntax("update target must be a table name")),
    };
    if assignments.len() != 1 {
        return Err(bad_syntax("update supports exactly one field assignment"));
    }
    let assignment = &assignments[0];
    let fldname = match &assignment.target {
        ast::AssignmentTarget::ColumnName(name) => object_name_to_string(name),
        _ => return Err(bad_syntax("update target field must be unqualified")),
    };
    let newval = expression_from_expr(&assignment.value)?;
    let pred = match selection {
        Some(expr) => predicate_from_expr(expr)?,
        None => Predicate::new(),
    };
    Ok(ModifyData { tblname, fldname, newval, pred })
}

fn create_table_data(ct: &ast::CreateTable) -> Result<CreateTableData> {
    let tblname = object_name_to_string(&ct.name);
    let mut sch = Schema::new();
    for col in &ct.columns {
        add_column(&mut sch, col)?;
    }
    Ok(CreateTableData { tblname, sch })
}

fn add_column(sch: &mut Schema, col: &ColumnDef) -> Result<()> {
    let fldname = col.name.value.to_lowercase();
    match &col.data_type {
        DataType::Int(_) | DataType::Integer(_) => sch.add_int_field(&fldname),
        DataType::Varchar(Some(len)) => {
            let n = match len {
                ast::CharacterLength::IntegerLength { length, .. } => *length as usize,
                ast::CharacterLength::Max => return Err(bad_syntax("varchar requires an explicit length")),
            };
            sch.add_string_field(&fldname, n);
        }
        _ => return Err(bad_syntax(format!("unsupported column type for {fldname}"))),
    }
    Ok(())
}

fn create_view_data(name: &ObjectName, query: &Query) -> Result<CreateViewData> {
    let viewname = object_name_to_string(name);
    let qrydata = query_data_from_query(query)?;
    Ok(CreateViewData { viewname, qrydata })
}

fn create_index_data(ci: &ast::CreateIndex) -> Result<CreateIndexData> {
    let idxname = ci
        .name
        .as_ref()
        .map(object_name_to_string)
        .ok_or_else(|| bad_syntax("create index requires a name"))?;
    let tblname = object_name_to_string(&ci.table_name);
    let fldname = match ci.columns.first() {
        Some(col) => match &col.column.expr {
            Expr::Identifier(ident) => ident.value.to_lowercase(),
            _ => return Err(bad_syntax("index column must be a field name")),
        },
        None => return Err(bad_syntax("create index requires one column")),
    };
    Ok(CreateIndexData { idxname, tblname, fldname })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_select_with_where() {
        let q = parse_query("select sname, gradyear from student where gradyear = 2024").unwrap();
        assert_eq!(q.fields, vec!["sname", "gradyear"]);
        assert_eq!(q.tables, vec!["student"]);
        assert_eq!(q.pred.terms().len(), 1);
    }

    #[test]
    fn parses_insert() {
        let cmd = parse_update_cmd("insert into student (sid, sname) values (1, 'joe')").unwrap();
        match cmd {
            UpdateCmd::Insert(data) => {
                assert_eq!(data.tblname, "student");
                assert_eq!(data.flds, vec!["sid", "sname"]);
                assert_eq!(data.vals, vec![Constant::Int(1), Constant::Str("joe".to_string())]);
            }
            _ => panic!("expected insert"),
        }
    }

    #[test]
    fn parses_create_table() {
        let cmd = parse_update_cmd("create table student (sname varchar(32), gradyear int)").unwrap();
        match cmd {
            UpdateCmd::CreateTable(data) => {
                assert_eq!(data.tblname, "student");
                assert!(data.sch.has_field("sname"));
                assert!(data.sch.has_field("gradyear"));
            }
            _ => panic!("expected create table"),
        }
    }

    #[test]
    fn parses_delete_with_predicate() {
        let cmd = parse_update_cmd("delete from student where sid = 1").unwrap();
        match cmd {
            UpdateCmd::Delete(data) => {
                assert_eq!(data.tblname, "student");
                assert_eq!(data.pred.terms().len(), 1);
            }
            _ => panic!("expected delete"),
        }
    }

    #[test]
    fn parses_update_statement() {
        let cmd = parse_update_cmd("update student set gradyear = 2025 where sid = 1").unwrap();
        match cmd {
            UpdateCmd::Modify(data) => {
                assert_eq!(data.tblname, "student");
                assert_eq!(data.fldname, "gradyear");
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn parses_create_index() {
        let cmd = parse_update_cmd("create index idx_sname on student (sname)").unwrap();
        match cmd {
            UpdateCmd::CreateIndex(data) => {
                assert_eq!(data.idxname, "idx_sname");
                assert_eq!(data.tblname, "student");
                assert_eq!(data.fldname, "sname");
            }
            _ => panic!("expected create index"),
        }
    }
}
