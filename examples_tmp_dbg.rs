use jamr::parser::lexer::Lexer;
fn main() {
    let src = "A = yes ; if $(A) = yes { R = then ; } else { R = else ; }";
    let tokens = Lexer::new(src, "test").tokenize().unwrap();
    for t in tokens {
        println!("{:?} {:?}", t.token_type, t.value);
    }
}
