use common::QuarryError;
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// Statements outside the standard grammar, recognized by a small hand
/// parser in front of sqlparser: the index DDL forms and the utility
/// commands.
#[derive(Debug, Clone, PartialEq)]
pub enum SpecialStatement {
    Help,
    ShowTables,
    ShowIndex { table: String },
    DescTable { table: String },
    CreateIndex { table: String, cols: Vec<String> },
    DropIndex { table: String, cols: Vec<String> },
    Checkpoint,
}

/// A parsed request: either statements sqlparser understands, or one of
/// the special forms.
#[derive(Debug)]
pub enum ParsedStatement {
    Sql(Vec<Statement>),
    Special(SpecialStatement),
}

/// Front-end parser wrapper around sqlparser's GenericDialect.
pub struct SQLParser;

impl SQLParser {
    pub fn new() -> Self {
        SQLParser
    }

    pub fn parse(&self, input: &str) -> Result<ParsedStatement, QuarryError> {
        let trimmed = input.trim().trim_end_matches(';').trim();
        if trimmed.is_empty() {
            return Err(QuarryError::SyntaxError(String::from("Empty SQL command")));
        }
        if let Some(special) = parse_special(trimmed)? {
            return Ok(ParsedStatement::Special(special));
        }
        let dialect = GenericDialect {};
        match Parser::parse_sql(&dialect, input) {
            Ok(statements) => Ok(ParsedStatement::Sql(statements)),
            Err(e) => Err(QuarryError::SyntaxError(format!("{}", e))),
        }
    }
}

impl Default for SQLParser {
    fn default() -> Self {
        SQLParser::new()
    }
}

/// Recognize the non-standard statements. Returns None when the input
/// should go to sqlparser instead.
fn parse_special(input: &str) -> Result<Option<SpecialStatement>, QuarryError> {
    let words: Vec<&str> = input.split_whitespace().collect();
    let upper: Vec<String> = words.iter().map(|w| w.to_uppercase()).collect();
    let keywords: Vec<&str> = upper.iter().map(|w| w.as_str()).collect();

    match keywords.as_slice() {
        ["HELP"] => Ok(Some(SpecialStatement::Help)),
        ["CHECKPOINT"] | ["CREATE", "STATIC_CHECKPOINT"] => {
            Ok(Some(SpecialStatement::Checkpoint))
        }
        ["SHOW", "TABLES"] => Ok(Some(SpecialStatement::ShowTables)),
        ["SHOW", "INDEX", "FROM", _] => Ok(Some(SpecialStatement::ShowIndex {
            table: words[3].to_string(),
        })),
        ["DESC", _] => Ok(Some(SpecialStatement::DescTable {
            table: words[1].to_string(),
        })),
        _ => {
            // CREATE INDEX t (c, ...) / DROP INDEX t (c, ...): the table
            // sits where standard SQL expects an index name, so sqlparser
            // cannot take these.
            if keywords.len() >= 2 && keywords[1] == "INDEX" {
                let create = match keywords[0] {
                    "CREATE" => true,
                    "DROP" => false,
                    _ => return Ok(None),
                };
                let rest = words[2..].join(" ");
                let (table, cols) = parse_table_col_list(&rest)?;
                return Ok(Some(if create {
                    SpecialStatement::CreateIndex { table, cols }
                } else {
                    SpecialStatement::DropIndex { table, cols }
                }));
            }
            Ok(None)
        }
    }
}

/// Parse `table (col [, col ...])`.
fn parse_table_col_list(input: &str) -> Result<(String, Vec<String>), QuarryError> {
    let open = input.find('(').ok_or_else(|| {
        QuarryError::SyntaxError(format!("Expected a column list in '{}'", input))
    })?;
    let close = input.rfind(')').ok_or_else(|| {
        QuarryError::SyntaxError(format!("Unbalanced column list in '{}'", input))
    })?;
    let table = input[..open].trim().to_string();
    if table.is_empty() || table.contains(char::is_whitespace) {
        return Err(QuarryError::SyntaxError(format!(
            "Expected a table name in '{}'",
            input
        )));
    }
    let cols: Vec<String> = input[open + 1..close]
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if cols.is_empty() {
        return Err(QuarryError::SyntaxError(format!(
            "Empty column list in '{}'",
            input
        )));
    }
    Ok((table, cols))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_create_index_form() {
        let parser = SQLParser::new();
        match parser.parse("CREATE INDEX t (a, b);").unwrap() {
            ParsedStatement::Special(SpecialStatement::CreateIndex { table, cols }) => {
                assert_eq!("t", table);
                assert_eq!(vec![String::from("a"), String::from("b")], cols);
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_drop_index_form() {
        let parser = SQLParser::new();
        match parser.parse("drop index t (a)").unwrap() {
            ParsedStatement::Special(SpecialStatement::DropIndex { table, cols }) => {
                assert_eq!("t", table);
                assert_eq!(vec![String::from("a")], cols);
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_utility_forms() {
        let parser = SQLParser::new();
        assert!(matches!(
            parser.parse("help;").unwrap(),
            ParsedStatement::Special(SpecialStatement::Help)
        ));
        assert!(matches!(
            parser.parse("SHOW TABLES;").unwrap(),
            ParsedStatement::Special(SpecialStatement::ShowTables)
        ));
        assert!(matches!(
            parser.parse("show index from t;").unwrap(),
            ParsedStatement::Special(SpecialStatement::ShowIndex { .. })
        ));
        assert!(matches!(
            parser.parse("desc t;").unwrap(),
            ParsedStatement::Special(SpecialStatement::DescTable { .. })
        ));
        assert!(matches!(
            parser.parse("checkpoint;").unwrap(),
            ParsedStatement::Special(SpecialStatement::Checkpoint)
        ));
    }

    #[test]
    fn test_standard_sql_passthrough() {
        let parser = SQLParser::new();
        match parser.parse("SELECT * FROM t WHERE a >= 2;").unwrap() {
            ParsedStatement::Sql(stmts) => assert_eq!(1, stmts.len()),
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_index_ddl() {
        let parser = SQLParser::new();
        assert!(parser.parse("CREATE INDEX t").is_err());
        assert!(parser.parse("CREATE INDEX t ()").is_err());
    }
}
