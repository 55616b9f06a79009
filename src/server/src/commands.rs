/// Server-level commands, written with a `\` prefix to separate them from
/// SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Commands {
    /// `\create <db>`: create a database.
    Create(String),
    /// `\connect <db>`: bind this client to a database.
    Connect(String),
    /// `\i <path> <table>`: import a CSV file into a table.
    Import(String),
    /// `\dt`: list tables of the connected database.
    ShowTables,
    /// `\l`: list databases.
    ShowDatabases,
    /// `\reset`: clear the connected database.
    Reset,
}

/// Parse a `\` command. Returns None for unknown commands.
pub fn parse_command(mut cmd: String) -> Option<Commands> {
    if cmd.ends_with('\n') {
        cmd.pop();
    }
    if let Some(rest) = cmd.strip_prefix("\\create ") {
        return Some(Commands::Create(rest.trim().to_string()));
    }
    if let Some(rest) = cmd.strip_prefix("\\connect ") {
        return Some(Commands::Connect(rest.trim().to_string()));
    }
    if let Some(rest) = cmd.strip_prefix("\\i ") {
        return Some(Commands::Import(rest.trim().to_string()));
    }
    match cmd.trim() {
        "\\dt" => Some(Commands::ShowTables),
        "\\l" => Some(Commands::ShowDatabases),
        "\\reset" => Some(Commands::Reset),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Some(Commands::Create(String::from("mydb"))),
            parse_command(String::from("\\create mydb\n"))
        );
        assert_eq!(
            Some(Commands::Connect(String::from("mydb"))),
            parse_command(String::from("\\connect mydb"))
        );
        assert_eq!(
            Some(Commands::Import(String::from("data.csv t"))),
            parse_command(String::from("\\i data.csv t"))
        );
        assert_eq!(Some(Commands::ShowTables), parse_command(String::from("\\dt")));
        assert_eq!(None, parse_command(String::from("\\bogus")));
    }
}
