//! Starter files for a freshly created project.

use codegenesis_preview::PreviewFile;

fn file(name: &str, language: &str, content: String) -> PreviewFile {
    let mut f = PreviewFile::new(name, content);
    f.language = Some(language.to_string());
    f
}

/// Files seeded into a new project of the given framework.
///
/// Unknown frameworks get the vanilla HTML/CSS/JS starter.
pub fn default_files(framework: &str, project_name: &str) -> Vec<PreviewFile> {
    let name = if project_name.trim().is_empty() {
        "My App"
    } else {
        project_name
    };

    match framework {
        "react" => react(name),
        _ => vanilla(name),
    }
}

fn vanilla(name: &str) -> Vec<PreviewFile> {
    vec![
        file(
            "index.html",
            "html",
            format!(
                r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{name}</title>
    <link rel="stylesheet" href="style.css">
</head>
<body>
    <main class="app">
        <h1>{name}</h1>
        <p>Describe what you want to build and CodeGenesis will write it here.</p>
        <button id="start">Get Started</button>
    </main>
    <script src="script.js"></script>
</body>
</html>"#
            ),
        ),
        file(
            "style.css",
            "css",
            r#"* { margin: 0; padding: 0; box-sizing: border-box; }
body {
    font-family: system-ui, -apple-system, sans-serif;
    background: #0b0b12;
    color: #f5f5f7;
    min-height: 100vh;
    display: flex;
    align-items: center;
    justify-content: center;
}
.app { text-align: center; padding: 2rem; }
h1 { font-size: 2.5rem; margin-bottom: 0.75rem; color: #a78bfa; }
p { color: rgba(255, 255, 255, 0.6); margin-bottom: 2rem; }
button {
    padding: 0.8rem 2.2rem;
    border: none;
    border-radius: 0.6rem;
    background: #6366f1;
    color: #fff;
    font-size: 1rem;
    cursor: pointer;
}
button:hover { background: #7c3aed; }"#
                .to_string(),
        ),
        file(
            "script.js",
            "javascript",
            format!(
                r#"// {name}
document.getElementById('start')?.addEventListener('click', (event) => {{
    event.target.textContent = 'Building...';
    setTimeout(() => {{ event.target.textContent = 'Get Started'; }}, 1500);
}});"#
            ),
        ),
    ]
}

fn react(name: &str) -> Vec<PreviewFile> {
    vec![
        file(
            "index.html",
            "html",
            format!(
                r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{name}</title>
</head>
<body>
    <div id="root"></div>
    <script type="module" src="/src/main.jsx"></script>
</body>
</html>"#
            ),
        ),
        file(
            "src/App.jsx",
            "javascript",
            format!(
                r#"import {{ useState }} from 'react'
import './App.css'

export default function App() {{
  const [count, setCount] = useState(0)
  return (
    <div className="app">
      <h1>{name}</h1>
      <button onClick={{() => setCount((c) => c + 1)}}>Count: {{count}}</button>
    </div>
  )
}}"#
            ),
        ),
        file(
            "src/App.css",
            "css",
            r#"body { margin: 0; font-family: system-ui; background: #0b0b12; color: #fff; }
.app { min-height: 100vh; display: flex; flex-direction: column; align-items: center; justify-content: center; gap: 1.5rem; }
button { padding: 0.75rem 2rem; border: none; border-radius: 0.5rem; background: #6366f1; color: #fff; cursor: pointer; }"#
                .to_string(),
        ),
    ]
}
