//! Authentication flows: classic login, guest login, token reconnect,
//! account binding, social binding, and social login.
//!
//! Password verification and hashing always happen on the persistence
//! worker thread, inside the repository callbacks, never on the tick loop.

use std::sync::OnceLock;

use fiefdom_protocol::packets::{
    BindAccountC2s, BindAccountResultS2c, BindSocialAccountC2s, BindSocialAccountResultS2c,
    GuestLoginC2s, LoginC2s, LoginResultS2c, ReconnectC2s, SocialLoginC2s,
};
use fiefdom_protocol::Opcode;
use regex::Regex;
use tracing::{error, info, warn};

use super::parse_payload;
use crate::auth;
use crate::network::dispatcher::PacketDispatcher;
use crate::network::transport::{PeerHandle, SendMode};

const MIN_PASSWORD_LEN: usize = 4;

fn username_is_valid(username: &str) -> bool {
    static USERNAME_RE: OnceLock<Regex> = OnceLock::new();
    USERNAME_RE
        .get_or_init(|| Regex::new("^[A-Za-z0-9_]{3,16}$").expect("valid username regex"))
        .is_match(username)
}

fn send_login_error(peer: &PeerHandle, message: &str) {
    peer.send(
        &LoginResultS2c {
            success: false,
            account_id: -1,
            message: message.to_owned(),
            session_token: String::new(),
        },
        SendMode::Reliable,
    );
}

fn send_login_success(peer: &PeerHandle, account_id: i64, message: &str, token: &str) {
    peer.send(
        &LoginResultS2c {
            success: true,
            account_id: account_id as i32,
            message: message.to_owned(),
            session_token: token.to_owned(),
        },
        SendMode::Reliable,
    );
}

fn send_bind_result(peer: &PeerHandle, success: bool, message: String) {
    peer.send(&BindAccountResultS2c { success, message }, SendMode::Reliable);
}

fn send_bind_social_result(peer: &PeerHandle, success: bool, message: String) {
    peer.send(
        &BindSocialAccountResultS2c { success, message },
        SendMode::Reliable,
    );
}

pub(super) fn register(dispatcher: &mut PacketDispatcher) {
    register_login(dispatcher);
    register_guest_login(dispatcher);
    register_reconnect(dispatcher);
    register_bind_account(dispatcher);
    register_bind_social_account(dispatcher);
    register_social_login(dispatcher);
}

fn register_login(dispatcher: &mut PacketDispatcher) {
    dispatcher.register(Opcode::LoginC2s, |state, peer, payload| {
        let Some(req) = parse_payload::<LoginC2s>(payload) else {
            return;
        };
        let username = req.username.to_owned();
        let password = req.password.to_owned();

        if !state.rate_limiter.check(peer.ip()) {
            warn!(peer = peer.id(), "login rate limit reached");
            send_login_error(peer, "Trop de tentatives. Reessayez dans 1 minute.");
            return;
        }

        if !username_is_valid(&username) {
            send_login_error(
                peer,
                "Pseudo invalide (3-16 caracteres, lettres/chiffres/underscores uniquement).",
            );
            return;
        }

        if password.len() < MIN_PASSWORD_LEN {
            send_login_error(peer, "Mot de passe trop court (4 caracteres minimum).");
            return;
        }

        info!(username = %username, "login requested");

        let peer_id = peer.id();
        let accounts = state.accounts.clone();
        let main = state.main_thread.clone();

        state
            .accounts
            .get_by_username(username.clone(), move |found| match found {
                Some(account) => {
                    let stored = account.password_hash.clone().unwrap_or_default();

                    if !auth::verify_password(&password, &stored) {
                        warn!(username = %username, "wrong password");
                        main.run(move |state| {
                            if let Some(peer) = state.sessions.find_peer(peer_id).cloned() {
                                send_login_error(&peer, "Mot de passe incorrect.");
                            }
                        });
                        return;
                    }

                    info!(username = %username, "existing account verified");
                    accounts.update_last_login(account.id);

                    main.run(move |state| {
                        let Some(peer) = state.sessions.find_peer(peer_id).cloned() else {
                            return;
                        };
                        let Some(token) = state.sessions.on_login(peer_id, account.id, None)
                        else {
                            return;
                        };
                        send_login_success(&peer, account.id, "Bienvenue de retour !", &token);
                    });
                }
                None => {
                    info!(username = %username, "account not found, creating");

                    accounts.create_account(username, password, move |ok, created| {
                        main.run(move |state| {
                            let Some(peer) = state.sessions.find_peer(peer_id).cloned() else {
                                return;
                            };

                            let Some(account) = created.filter(|_| ok) else {
                                send_login_error(&peer, "Echec creation du compte.");
                                return;
                            };

                            let Some(token) = state.sessions.on_login(peer_id, account.id, None)
                            else {
                                return;
                            };
                            send_login_success(
                                &peer,
                                account.id,
                                "Compte cree avec succes !",
                                &token,
                            );
                        });
                    });
                }
            });
    });
}

fn register_guest_login(dispatcher: &mut PacketDispatcher) {
    dispatcher.register(Opcode::GuestLoginC2s, |state, peer, payload| {
        let Some(req) = parse_payload::<GuestLoginC2s>(payload) else {
            return;
        };
        let device_id = req.device_id.to_owned();

        if !state.rate_limiter.check(peer.ip()) {
            send_login_error(peer, "Trop de tentatives.");
            return;
        }

        if device_id.is_empty() {
            send_login_error(peer, "Identifiant d'appareil invalide.");
            return;
        }

        info!(device_id = %device_id, "guest login requested");

        let peer_id = peer.id();
        let accounts = state.accounts.clone();
        let main = state.main_thread.clone();

        state
            .accounts
            .get_by_device_id(device_id.clone(), move |found| match found {
                Some(account) => {
                    accounts.update_last_login(account.id);

                    main.run(move |state| {
                        let Some(peer) = state.sessions.find_peer(peer_id).cloned() else {
                            return;
                        };
                        let Some(token) = state.sessions.on_login(peer_id, account.id, None)
                        else {
                            return;
                        };
                        send_login_success(&peer, account.id, "Connexion invite reussie !", &token);
                    });
                }
                None => {
                    let guest_name: String =
                        format!("Guest_{}", device_id.chars().take(8).collect::<String>());
                    info!(username = %guest_name, "creating guest account");

                    accounts.create_guest_account(device_id, guest_name, move |ok, created| {
                        main.run(move |state| {
                            let Some(peer) = state.sessions.find_peer(peer_id).cloned() else {
                                return;
                            };

                            let Some(account) = created.filter(|_| ok) else {
                                send_login_error(&peer, "Impossible de creer le compte invite.");
                                return;
                            };

                            let Some(token) = state.sessions.on_login(peer_id, account.id, None)
                            else {
                                return;
                            };
                            send_login_success(
                                &peer,
                                account.id,
                                "Bienvenue au nouveau joueur !",
                                &token,
                            );
                        });
                    });
                }
            });
    });
}

fn register_reconnect(dispatcher: &mut PacketDispatcher) {
    dispatcher.register(Opcode::ReconnectC2s, |state, peer, payload| {
        let Some(req) = parse_payload::<ReconnectC2s>(payload) else {
            return;
        };
        let account_id = i64::from(req.account_id);

        if !state.rate_limiter.check(peer.ip()) {
            send_login_error(peer, "Trop de tentatives.");
            return;
        }

        // Pure in-memory validation, no database round trip.
        if !state.sessions.validate_token(account_id, req.session_token) {
            warn!(account_id, "invalid or expired session token");
            send_login_error(peer, "Session invalide. Veuillez vous reconnecter.");
            return;
        }

        info!(account_id, "reconnect accepted");
        state.accounts.update_last_login(account_id);

        let peer_id = peer.id();
        state.main_thread.run(move |state| {
            let Some(peer) = state.sessions.find_peer(peer_id).cloned() else {
                return;
            };
            // A fresh token is issued on every reconnect; the old one
            // stops validating.
            let Some(token) = state.sessions.on_login(peer_id, account_id, None) else {
                return;
            };
            send_login_success(&peer, account_id, "Reconnexion reussie !", &token);
        });
    });
}

fn register_bind_account(dispatcher: &mut PacketDispatcher) {
    dispatcher.register(Opcode::BindAccountC2s, |state, peer, payload| {
        let Some(session) = state.sessions.get(peer.id()) else {
            send_bind_result(peer, false, "Vous n'etes pas connecte.".to_owned());
            return;
        };
        let account_id = session.player_id;

        let Some(req) = parse_payload::<BindAccountC2s>(payload) else {
            return;
        };
        let username = req.username.to_owned();
        let password = req.password.to_owned();

        if !state.rate_limiter.check(peer.ip()) {
            send_bind_result(peer, false, "Trop de requetes. Veuillez patienter.".to_owned());
            return;
        }

        if !username_is_valid(&username) {
            send_bind_result(
                peer,
                false,
                "Pseudo invalide (3-16 caracteres, alphanumerique).".to_owned(),
            );
            return;
        }

        if password.len() < MIN_PASSWORD_LEN {
            send_bind_result(
                peer,
                false,
                "Mot de passe trop court (4 caracteres minimum).".to_owned(),
            );
            return;
        }

        info!(username = %username, account_id, "account bind requested");

        let peer_id = peer.id();
        let accounts = state.accounts.clone();
        let main = state.main_thread.clone();

        // Check availability first; hash and bind only if the name is
        // free. Both run on the worker thread.
        state
            .accounts
            .get_by_username(username.clone(), move |found| {
                if found.is_some() {
                    main.run(move |state| {
                        if let Some(peer) = state.sessions.find_peer(peer_id).cloned() {
                            send_bind_result(&peer, false, "Ce pseudo est deja utilise.".to_owned());
                        }
                    });
                    return;
                }

                let hash = match auth::hash_password(&password) {
                    Ok(hash) => hash,
                    Err(e) => {
                        error!("password hashing failed: {e}");
                        main.run(move |state| {
                            if let Some(peer) = state.sessions.find_peer(peer_id).cloned() {
                                send_bind_result(
                                    &peer,
                                    false,
                                    "Erreur serveur lors de la liaison de compte.".to_owned(),
                                );
                            }
                        });
                        return;
                    }
                };

                accounts.bind_account(account_id, username.clone(), hash, move |ok| {
                    main.run(move |state| {
                        let Some(peer) = state.sessions.find_peer(peer_id).cloned() else {
                            return;
                        };

                        if ok {
                            info!(peer = peer_id, username = %username, "account bind complete");
                            send_bind_result(
                                &peer,
                                true,
                                format!("Compte '{username}' lie avec succes !"),
                            );
                        } else {
                            send_bind_result(
                                &peer,
                                false,
                                "Erreur serveur lors de la liaison de compte.".to_owned(),
                            );
                        }
                    });
                });
            });
    });
}

fn register_bind_social_account(dispatcher: &mut PacketDispatcher) {
    dispatcher.register(Opcode::BindSocialAccountC2s, |state, peer, payload| {
        let Some(session) = state.sessions.get(peer.id()) else {
            send_bind_social_result(peer, false, "Vous n'etes pas connecte.".to_owned());
            return;
        };
        let account_id = session.player_id;

        let Some(req) = parse_payload::<BindSocialAccountC2s>(payload) else {
            return;
        };
        let provider = req.provider.to_owned();
        let provider_id = req.provider_id.to_owned();

        if !state.rate_limiter.check(peer.ip()) {
            send_bind_social_result(
                peer,
                false,
                "Trop de requetes. Veuillez patienter.".to_owned(),
            );
            return;
        }

        if provider.is_empty() || provider_id.is_empty() {
            send_bind_social_result(
                peer,
                false,
                "Informations de fournisseur invalides.".to_owned(),
            );
            return;
        }

        info!(provider = %provider, provider_id = %provider_id, "social bind requested");

        let peer_id = peer.id();
        let accounts = state.accounts.clone();
        let main = state.main_thread.clone();

        // Refuse if this social identity is already linked somewhere.
        state.accounts.get_by_social_id(
            provider.clone(),
            provider_id.clone(),
            move |found| {
                if found.is_some() {
                    let provider = provider.clone();
                    main.run(move |state| {
                        if let Some(peer) = state.sessions.find_peer(peer_id).cloned() {
                            send_bind_social_result(
                                &peer,
                                false,
                                format!("Ce compte {provider} est deja lie a un autre joueur."),
                            );
                        }
                    });
                    return;
                }

                accounts.bind_social_account(
                    account_id,
                    provider.clone(),
                    provider_id,
                    move |ok| {
                        main.run(move |state| {
                            let Some(peer) = state.sessions.find_peer(peer_id).cloned() else {
                                return;
                            };

                            if ok {
                                info!(peer = peer_id, provider = %provider, "social bind complete");
                                send_bind_social_result(
                                    &peer,
                                    true,
                                    format!("Liaison {provider} reussie !"),
                                );
                            } else {
                                send_bind_social_result(
                                    &peer,
                                    false,
                                    format!("Erreur serveur lors de la liaison {provider}."),
                                );
                            }
                        });
                    },
                );
            },
        );
    });
}

fn register_social_login(dispatcher: &mut PacketDispatcher) {
    dispatcher.register(Opcode::SocialLoginC2s, |state, peer, payload| {
        let Some(req) = parse_payload::<SocialLoginC2s>(payload) else {
            return;
        };
        let provider = req.provider.to_owned();
        let provider_id = req.provider_id.to_owned();

        if !state.rate_limiter.check(peer.ip()) {
            send_login_error(peer, "Trop de tentatives. Veuillez patienter.");
            return;
        }

        info!(provider = %provider, provider_id = %provider_id, "social login requested");

        let peer_id = peer.id();
        let accounts = state.accounts.clone();
        let main = state.main_thread.clone();

        state
            .accounts
            .get_by_social_id(provider, provider_id, move |found| {
                main.run(move |state| {
                    let Some(peer) = state.sessions.find_peer(peer_id).cloned() else {
                        return;
                    };

                    let Some(account) = found else {
                        send_login_error(&peer, "Aucun compte n'est lie a ce login social.");
                        return;
                    };

                    let Some(token) = state.sessions.on_login(peer_id, account.id, None) else {
                        return;
                    };

                    accounts.update_last_login(account.id);
                    send_login_success(&peer, account.id, "Connexion social reussie !", &token);
                    info!(username = %account.username, id = account.id, "social login complete");
                });
            });
    });
}
