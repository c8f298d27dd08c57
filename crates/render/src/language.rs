//! Language inference for untagged code fences

use lens_core::Language;

/// Guess the language of an untagged code block. Falls back to `Text`.
pub fn infer(code: &str) -> Language {
  let trimmed = code.trim();
  if trimmed.is_empty() {
    return Language::Text;
  }

  let lines: Vec<&str> = trimmed.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

  if lines.iter().any(|l| is_smali(l)) {
    return Language::Smali;
  }

  if trimmed.starts_with("<?xml")
    || (trimmed.starts_with('<') && trimmed[1..].starts_with(|c: char| c.is_ascii_alphabetic() || c == '!'))
  {
    return Language::Xml;
  }

  if (trimmed.starts_with('{') || trimmed.starts_with('['))
    && serde_json::from_str::<serde_json::Value>(trimmed).is_ok_and(|v| v.is_object() || v.is_array())
  {
    return Language::Json;
  }

  if lines.iter().any(|l| is_kotlin(l)) {
    return Language::Kotlin;
  }

  if lines.iter().any(|l| l.starts_with("def ") && l.ends_with(':')) {
    return Language::Python;
  }

  if lines
    .iter()
    .any(|l| l.starts_with("function ") || l.contains("console.log(") || l.starts_with("const "))
  {
    return Language::JavaScript;
  }

  if lines.iter().any(|l| is_java(l)) {
    return Language::Java;
  }

  Language::Text
}

fn is_smali(line: &str) -> bool {
  [".method", ".class", ".super", ".field", ".locals", ".registers"]
    .iter()
    .any(|d| line.starts_with(d))
    || line.starts_with("invoke-")
    || line.contains(" invoke-")
}

fn is_kotlin(line: &str) -> bool {
  line.starts_with("fun ")
    || line.starts_with("val ")
    || line.starts_with("data class ")
    || line.starts_with("object ")
    || line.contains(" fun ")
    || line.starts_with("companion object")
}

fn is_java(line: &str) -> bool {
  line.starts_with("import java")
    || line.starts_with("package ")
    || line.starts_with("public ")
    || line.starts_with("private ")
    || line.starts_with("protected ")
    || line.starts_with("class ")
    || line.contains(" class ")
    || line.ends_with(';')
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_smali() {
    let code = ".method public onCreate(Landroid/os/Bundle;)V\n    .locals 1\n    invoke-super {p0, p1}, Landroid/app/Activity;->onCreate(Landroid/os/Bundle;)V\n.end method";
    assert_eq!(infer(code), Language::Smali);
  }

  #[test]
  fn test_xml() {
    assert_eq!(infer("<?xml version=\"1.0\"?>\n<manifest/>"), Language::Xml);
    assert_eq!(
      infer("<uses-permission android:name=\"android.permission.READ_SMS\"/>"),
      Language::Xml
    );
  }

  #[test]
  fn test_json() {
    assert_eq!(infer("{\"key\": [1, 2]}"), Language::Json);
    // Braces alone do not make JSON
    assert_ne!(infer("{ doSomething(); }"), Language::Json);
  }

  #[test]
  fn test_kotlin_before_java() {
    assert_eq!(infer("class Foo {\n    fun bar() = 1\n}"), Language::Kotlin);
    assert_eq!(infer("val x = listOf(1, 2)"), Language::Kotlin);
  }

  #[test]
  fn test_java() {
    assert_eq!(infer("public class Foo {\n    private int x;\n}"), Language::Java);
    assert_eq!(infer("String s = getDeviceId();"), Language::Java);
  }

  #[test]
  fn test_python_and_javascript() {
    assert_eq!(infer("def run(x):\n    return x"), Language::Python);
    assert_eq!(infer("function f() { return 1 }"), Language::JavaScript);
  }

  #[test]
  fn test_fallback_is_text() {
    assert_eq!(infer("adb shell pm list packages"), Language::Text);
    assert_eq!(infer("   "), Language::Text);
  }
}
