// Maps a detected characteristic (exact filename, or lowercase extension)
// to the entry-point patterns worth auto-including for that kind of project.
pub fn map_characteristic_to_patterns(characteristic: &str) -> &'static [&'static str] {
    match characteristic {
        // Filenames (exact match)
        "package.json" => &["src/main.*", "src/index.*", "src/App.*", "index.html"],
        "Cargo.toml" => &["src/main.rs", "src/lib.rs"],
        "pyproject.toml" | "requirements.txt" => &["main.py", "app.py", "manage.py"],
        "go.mod" => &["main.go", "cmd/*/main.go"],
        "Gemfile" => &["Gemfile", "config/routes.rb"],
        "composer.json" => &["composer.json", "routes/web.php"],
        "Makefile" => &["Makefile"],

        // Extensions (matched lowercase)
        "prisma" => &["prisma/schema.prisma"],
        "graphql" | "gql" => &["**/schema.graphql"],
        "sql" => &["**/schema.sql"],
        _ => &[],
    }
}

/// Patterns auto-included for every project, before any detection.
pub fn get_default_patterns() -> Vec<&'static str> {
    crate::output_formats::get_builtin_defaults()
        .smart_defaults
        .iter()
        .map(String::as_str)
        .collect()
}
